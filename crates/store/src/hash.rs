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

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use ahash::AHashMap;

use crate::{Error, FLAG_FIXED, FLAG_FOLD_FIX};

/// Read-only table loaded from a `key value` text file, one entry per line,
/// `#` comments. The file mtime is recorded at open so a daemon holding the
/// handle can detect that the table was rebuilt on disk and restart itself.
#[derive(Debug, Clone)]
pub struct HashTable {
    path: PathBuf,
    entries: Arc<AHashMap<String, String>>,
    modified: Option<SystemTime>,
    flags: u64,
}

impl HashTable {
    pub async fn open(path: impl AsRef<Path>, flags: u64) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = tokio::fs::read_to_string(&path).await.map_err(Error::Io)?;
        let fold = flags & FLAG_FOLD_FIX != 0;

        let mut entries = AHashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };
            let key = if fold { key.to_lowercase() } else { key.to_string() };
            entries.insert(key, value.to_string());
        }

        Ok(HashTable {
            modified: modified_time(&path),
            path,
            entries: Arc::new(entries),
            flags: flags | FLAG_FIXED,
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.flags & FLAG_FOLD_FIX != 0 {
            self.entries.get(&key.to_lowercase()).cloned()
        } else {
            self.entries.get(key).cloned()
        }
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// The table changed when the file was replaced, touched or removed.
    pub fn has_changed(&self) -> bool {
        modified_time(&self.path) != self.modified
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
