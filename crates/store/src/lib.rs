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

pub mod hash;
pub mod memory;
pub mod sql;

use std::fmt::Display;

use hash::HashTable;
use memory::MemoryTable;
use sql::SqlTable;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Sql(sqlx::Error),
    InvalidRef(String),
    Unsupported(&'static str),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Sql(err) => write!(f, "SQL error: {err}"),
            Error::InvalidRef(table_ref) => write!(f, "Invalid table reference {table_ref:?}"),
            Error::Unsupported(reason) => write!(f, "Unsupported operation: {reason}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Sql(err)
    }
}

// Open and capability flags. A table reports back the open flags it honored
// plus its own capabilities.
pub const FLAG_FIXED: u64 = 1 << 0;
pub const FLAG_FOLD_FIX: u64 = 1 << 1;
pub const FLAG_DUP_REPLACE: u64 = 1 << 2;
pub const FLAG_SYNC_UPDATE: u64 = 1 << 3;
pub const FLAG_CREATE: u64 = 1 << 4;

/// An open lookup table. Handles are cheap to clone; clones share the same
/// backing state.
#[derive(Debug, Clone)]
pub enum Table {
    Memory(MemoryTable),
    Hash(HashTable),
    Sql(SqlTable),
}

impl Table {
    /// Open a table from a `type:name` reference.
    pub async fn open(table_ref: &str, flags: u64) -> Result<Table> {
        let (typ, name) = table_ref
            .split_once(':')
            .ok_or_else(|| Error::InvalidRef(table_ref.to_string()))?;
        match typ {
            "memory" => Ok(Table::Memory(MemoryTable::open(flags))),
            "hash" => HashTable::open(name, flags).await.map(Table::Hash),
            "sql" => SqlTable::open(name, flags).await.map(Table::Sql),
            _ => Err(Error::InvalidRef(table_ref.to_string())),
        }
    }

    /// Look up a key. `Ok(None)` means the key is not present; errors are
    /// transient backend failures.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Table::Memory(table) => Ok(table.get(key)),
            Table::Hash(table) => Ok(table.get(key)),
            Table::Sql(table) => table.get(key).await,
        }
    }

    /// Store a key, replacing any existing value.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Table::Memory(table) => {
                table.put(key, value);
                Ok(())
            }
            Table::Hash(_) => Err(Error::Unsupported("hash tables are read-only")),
            Table::Sql(table) => table.put(key, value).await,
        }
    }

    /// Remove a key; removing an absent key is not an error.
    pub async fn del(&self, key: &str) -> Result<()> {
        match self {
            Table::Memory(table) => {
                table.del(key);
                Ok(())
            }
            Table::Hash(_) => Err(Error::Unsupported("hash tables are read-only")),
            Table::Sql(table) => table.del(key).await,
        }
    }

    pub fn flags(&self) -> u64 {
        match self {
            Table::Memory(table) => table.flags(),
            Table::Hash(table) => table.flags(),
            Table::Sql(table) => table.flags(),
        }
    }

    /// Whether the backing file changed on disk after the table was opened.
    pub fn has_changed(&self) -> bool {
        match self {
            Table::Memory(_) | Table::Sql(_) => false,
            Table::Hash(table) => table.has_changed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Table, FLAG_CREATE};

    #[tokio::test]
    async fn open_rejects_invalid_refs() {
        assert!(Table::open("no-colon", 0).await.is_err());
        assert!(Table::open("cdb:/etc/unknown-type", 0).await.is_err());
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let table = Table::open("memory:test", FLAG_CREATE).await.unwrap();
        assert_eq!(table.get("k").await.unwrap(), None);
        table.put("k", "v").await.unwrap();
        assert_eq!(table.get("k").await.unwrap(), Some("v".to_string()));
        table.put("k", "v2").await.unwrap();
        assert_eq!(table.get("k").await.unwrap(), Some("v2".to_string()));
        table.del("k").await.unwrap();
        table.del("k").await.unwrap();
        assert_eq!(table.get("k").await.unwrap(), None);
        assert!(!table.has_changed());
    }
}
