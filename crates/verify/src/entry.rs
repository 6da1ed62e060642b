/*
 * Copyright (c) 2023 Stalwart Labs Ltd.
 *
 * This file is part of Stalwart Mail Server.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of
 * the License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 * in the LICENSE file at the top-level directory of this distribution.
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * You can be released from the requirements of the AGPLv3 license by
 * purchasing a commercial license. Please contact licensing@stalw.art
 * for more details.
*/

use mail_proto::AddrStatus;

/// A cache record, stored as the text `status:probed:updated:text`.
///
/// - `status`: the last known deliverability status. `Todo` means the
///   address is being probed and nothing is known yet.
/// - `probed`: time of the last outstanding probe, `0` when none.
/// - `updated`: time of the last probe result applied, `0` when unknown.
/// - `text`: diagnostic text from delivery agents, may contain colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub status: AddrStatus,
    pub probed: u64,
    pub updated: u64,
    pub text: String,
}

impl Entry {
    pub fn new(status: AddrStatus, probed: u64, updated: u64, text: impl Into<String>) -> Self {
        Entry {
            status,
            probed,
            updated,
            text: text.into(),
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.status.code(),
            self.probed,
            self.updated,
            self.text
        )
    }

    /// Parse a stored record. Splits on the first three colons only, so
    /// diagnostic text keeps any colons of its own. Returns `None` when a
    /// leading field is missing or not one of the allowed codes; the caller
    /// treats that the same as a missing entry.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.splitn(4, ':');
        let status = fields
            .next()?
            .parse::<u64>()
            .ok()
            .and_then(AddrStatus::from_code)?;
        let probed = fields.next()?.parse::<u64>().ok()?;
        let updated = fields.next()?.parse::<u64>().ok()?;
        let text = fields.next()?;
        Some(Entry {
            status,
            probed,
            updated,
            text: text.to_string(),
        })
    }

    /// Extract the status alone by decimal-parsing the record prefix,
    /// without allocating a parsed record.
    pub fn status_from_raw(raw: &str) -> Option<AddrStatus> {
        let digits = raw.split(':').next().unwrap_or("");
        digits.parse::<u64>().ok().and_then(AddrStatus::from_code)
    }
}
