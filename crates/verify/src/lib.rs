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

//! Address verification cache service.
//!
//! Maintains a record of which recipient addresses are known to be
//! deliverable or undeliverable. Addresses are verified by submitting probe
//! messages to the mail queue; probes run through the routing machinery but
//! are discarded rather than delivered. The cache relies on the answer from
//! the nearest MTA and therefore cannot detect every undeliverable address.

pub mod cache;
pub mod entry;
pub mod probe;
pub mod session;
pub mod spawn;

use probe::ProbeQueue;
use store::Table;

/// A probe is assumed lost when no response arrives within this many
/// seconds; only then may a new probe for the same address be sent.
pub const PROBE_TTL: u64 = 1000;

pub struct VerifyCore {
    pub map: Table,
    pub queue: ProbeQueue,
    pub config: VerifyConfig,
}

/// Cache tunables, in seconds.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub map_ref: String,
    pub sender: String,
    pub positive_expire: u64,
    pub positive_refresh: u64,
    pub negative_expire: u64,
    pub negative_refresh: u64,
    pub negative_cache: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            map_ref: String::new(),
            sender: spawn::DEFAULT_SENDER.to_string(),
            positive_expire: 31 * 86400,
            positive_refresh: 7 * 86400,
            negative_expire: 3 * 86400,
            negative_refresh: 3 * 3600,
            negative_cache: true,
        }
    }
}
