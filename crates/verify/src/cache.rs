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

use mail_proto::{AddrStatus, VrfyStat};

use crate::{entry::Entry, VerifyCore, PROBE_TTL};

pub const IN_PROGRESS: &str = "Address verification in progress";

/// Outcome of a query. The reply fields go back to the client first; when
/// `refresh` is set, the working record still needs a probe, which is
/// submitted only after the reply has been flushed.
#[derive(Debug)]
pub struct QueryReply {
    pub status: AddrStatus,
    pub text: String,
    pub refresh: Option<Entry>,
}

impl VerifyCore {
    /// Look up the status of an address, substituting a fresh `Todo` record
    /// when nothing usable is stored.
    pub async fn query(&self, address: &str, now: u64) -> QueryReply {
        // A backend failure or an unparseable record is treated as missing.
        let raw = match self.map.get(address).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    context = "cache",
                    event = "error",
                    address = address,
                    reason = %err,
                    "Backing table lookup failed."
                );
                None
            }
        };
        let mut entry = raw.as_deref().and_then(|raw| {
            let parsed = Entry::parse(raw);
            if parsed.is_none() {
                tracing::warn!(
                    context = "cache",
                    event = "bad-entry",
                    address = address,
                    "Malformed cache entry: {:?}",
                    raw
                );
            }
            parsed
        });

        // Produce a default record when no usable record exists. When
        // negative caching is disabled, an unusable stored record is also
        // purged here; the refresh write-back below is gated separately and
        // the two must stay ordered this way.
        let usable = entry.as_ref().is_some_and(|entry| {
            !(probe_ttl_elapsed(entry.probed, now)
                && (self.positive_expired(entry, now) || self.negative_expired(entry, now)))
        });
        if !usable {
            if raw.is_some() && !self.config.negative_cache {
                if let Err(err) = self.map.del(address).await {
                    tracing::warn!(
                        context = "cache",
                        event = "error",
                        address = address,
                        reason = %err,
                        "Failed to purge expired entry."
                    );
                }
            }
            entry = Some(Entry::new(AddrStatus::Todo, 0, 0, IN_PROGRESS));
        }
        let entry = entry.unwrap();

        tracing::debug!(
            context = "cache",
            event = "query",
            address = address,
            status = ?entry.status,
            probed = entry.probed,
            updated = entry.updated,
        );

        let refresh_needed = probe_ttl_elapsed(entry.probed, now)
            && (self.positive_refresh_needed(&entry, now)
                || self.negative_refresh_needed(&entry, now));

        QueryReply {
            status: entry.status,
            text: entry.text.clone(),
            refresh: refresh_needed.then_some(entry),
        }
    }

    /// Submit a probe for an address whose record needs refreshing, and mark
    /// the record as probed. No state changes unless the probe was actually
    /// queued. When negative caching is off, only existing entries are
    /// refreshed; a record that carries nothing but `Todo` is not persisted.
    pub async fn refresh(&self, address: &str, entry: &Entry, now: u64) {
        tracing::debug!(
            context = "probe",
            event = "submit",
            address = address,
            status = ?entry.status,
            updated = entry.updated,
        );
        if !self.queue.submit(&self.config.sender, address).await {
            return;
        }
        if entry.updated != 0 || self.config.negative_cache {
            let record = Entry::new(entry.status, now, entry.updated, entry.text.clone());
            if let Err(err) = self.map.put(address, &record.serialize()).await {
                tracing::warn!(
                    context = "cache",
                    event = "error",
                    address = address,
                    reason = %err,
                    "Failed to store probed entry."
                );
            }
        }
    }

    /// Apply a probe result.
    pub async fn update(&self, address: &str, status_code: u64, text: &str, now: u64) -> VrfyStat {
        let status = match AddrStatus::from_code(status_code).filter(AddrStatus::is_probe_result) {
            Some(status) => status,
            None => {
                tracing::warn!(
                    context = "cache",
                    event = "bad-status",
                    address = address,
                    status = status_code,
                    "Invalid recipient status in update request."
                );
                return VrfyStat::Bad;
            }
        };

        // Don't let a failed probe clobber an OK address before it expires.
        // The failed probe is ignored so the address is re-probed on a later
        // query; as long as some probes succeed the address stays cached OK.
        if status != AddrStatus::Ok {
            let stored_ok = match self.map.get(address).await {
                Ok(Some(raw)) => Entry::status_from_raw(&raw) == Some(AddrStatus::Ok),
                Ok(None) => false,
                Err(err) => {
                    tracing::warn!(
                        context = "cache",
                        event = "error",
                        address = address,
                        reason = %err,
                        "Backing table lookup failed."
                    );
                    false
                }
            };
            if stored_ok {
                return VrfyStat::Ok;
            }
        }

        let entry = Entry::new(status, 0, now, text);
        match self.map.put(address, &entry.serialize()).await {
            Ok(()) => {
                tracing::debug!(
                    context = "cache",
                    event = "update",
                    address = address,
                    status = ?status,
                    updated = now,
                );
                VrfyStat::Ok
            }
            Err(err) => {
                tracing::warn!(
                    context = "cache",
                    event = "error",
                    address = address,
                    reason = %err,
                    "Failed to store updated entry."
                );
                VrfyStat::Fail
            }
        }
    }

    fn positive_expired(&self, entry: &Entry, now: u64) -> bool {
        entry.status == AddrStatus::Ok
            && threshold_elapsed(entry.updated, self.config.positive_expire, now)
    }

    fn negative_expired(&self, entry: &Entry, now: u64) -> bool {
        entry.status != AddrStatus::Ok
            && threshold_elapsed(entry.updated, self.config.negative_expire, now)
    }

    fn positive_refresh_needed(&self, entry: &Entry, now: u64) -> bool {
        entry.status == AddrStatus::Ok
            && threshold_elapsed(entry.updated, self.config.positive_refresh, now)
    }

    fn negative_refresh_needed(&self, entry: &Entry, now: u64) -> bool {
        entry.status != AddrStatus::Ok
            && threshold_elapsed(entry.updated, self.config.negative_refresh, now)
    }
}

/// An `updated` of zero means nothing is known, which never counts as fresh.
fn threshold_elapsed(updated: u64, ttl: u64, now: u64) -> bool {
    updated == 0 || updated + ttl < now
}

/// A `probed` of zero means no probe is outstanding.
fn probe_ttl_elapsed(probed: u64, now: u64) -> bool {
    probed == 0 || now.saturating_sub(probed) > PROBE_TTL
}
