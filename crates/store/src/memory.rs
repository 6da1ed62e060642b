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

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::FLAG_DUP_REPLACE;

/// Volatile in-process table. State is lost when the process exits, which is
/// why a service backed by one must not be recycled by the skeleton.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    entries: Arc<Mutex<AHashMap<String, String>>>,
    flags: u64,
}

impl MemoryTable {
    pub fn open(flags: u64) -> Self {
        MemoryTable {
            entries: Arc::new(Mutex::new(AHashMap::new())),
            flags: flags | FLAG_DUP_REPLACE,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
    }

    pub fn del(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
