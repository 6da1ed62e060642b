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

//! Lookup table proxy service.
//!
//! Gives read-only access to a pre-approved set of lookup tables on behalf
//! of processes that cannot open the tables themselves, for instance
//! because they run chrooted or because the table driver would carry
//! credentials into an untrusted process. One open table handle is shared
//! by all clients asking for the same table with the same flags.

pub mod access;
pub mod handle;
pub mod session;
pub mod spawn;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use store::Table;

pub struct ProxyCore {
    /// The pre-approved, canonical `type:name` table references. Immutable
    /// for the process lifetime.
    pub allowed: AHashSet<String>,

    /// Open handles keyed by `type:name:octal-flags`. Handles are opened
    /// lazily and never closed; the process restarts itself when a table
    /// changes on disk, which tears all of them down at once.
    pub handles: Mutex<AHashMap<String, Table>>,
}
