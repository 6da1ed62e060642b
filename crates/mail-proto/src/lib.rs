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

pub mod attr;
pub mod client;

use std::fmt::Display;

// Attribute names shared by both services.
pub const ATTR_REQUEST: &str = "request";
pub const ATTR_ADDRESS: &str = "address";
pub const ATTR_ADDRESS_STATUS: &str = "address_status";
pub const ATTR_REASON: &str = "reason";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_TABLE: &str = "table";
pub const ATTR_FLAGS: &str = "flags";
pub const ATTR_KEY: &str = "key";
pub const ATTR_VALUE: &str = "value";

// Request names.
pub const VRFY_REQ_QUERY: &str = "query";
pub const VRFY_REQ_UPDATE: &str = "update";
pub const PROXY_REQ_OPEN: &str = "open";
pub const PROXY_REQ_LOOKUP: &str = "lookup";

/// Server reply status of the verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrfyStat {
    Ok = 0,
    Bad = 1,
    Fail = 2,
}

/// Deliverability status of a recipient address. The numeric codes follow
/// the delivery status convention: `4` and `5` mirror the transient and
/// permanent SMTP reply classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrStatus {
    Ok = 0,
    Defer = 4,
    Bounce = 5,
    Todo = 6,
}

/// Reply status of the table proxy service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStat {
    Ok = 0,
    Retry = 1,
    NoKey = 2,
    Bad = 3,
    Deny = 4,
}

impl VrfyStat {
    pub fn code(&self) -> u64 {
        *self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(VrfyStat::Ok),
            1 => Some(VrfyStat::Bad),
            2 => Some(VrfyStat::Fail),
            _ => None,
        }
    }
}

impl AddrStatus {
    pub fn code(&self) -> u64 {
        *self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(AddrStatus::Ok),
            4 => Some(AddrStatus::Defer),
            5 => Some(AddrStatus::Bounce),
            6 => Some(AddrStatus::Todo),
            _ => None,
        }
    }

    /// Whether this status may be reported by a probe result. `Todo` is a
    /// server-internal placeholder and never a valid update.
    pub fn is_probe_result(&self) -> bool {
        matches!(self, AddrStatus::Ok | AddrStatus::Defer | AddrStatus::Bounce)
    }
}

impl ProxyStat {
    pub fn code(&self) -> u64 {
        *self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ProxyStat::Ok),
            1 => Some(ProxyStat::Retry),
            2 => Some(ProxyStat::NoKey),
            3 => Some(ProxyStat::Bad),
            4 => Some(ProxyStat::Deny),
            _ => None,
        }
    }
}

impl Display for AddrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AddrStatus::Ok => "deliverable",
            AddrStatus::Defer | AddrStatus::Bounce => "undeliverable",
            AddrStatus::Todo => "unknown",
        })
    }
}

impl Display for ProxyStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProxyStat::Ok => "ok",
            ProxyStat::Retry => "retry",
            ProxyStat::NoKey => "no-key",
            ProxyStat::Bad => "bad-request",
            ProxyStat::Deny => "denied",
        })
    }
}
