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

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{FLAG_CREATE, FLAG_DUP_REPLACE, FLAG_SYNC_UPDATE};

/// Persistent key-value table backed by SQLite. Every mutation is a single
/// statement, so concurrent readers in other processes observe per-key
/// atomic replaces.
#[derive(Debug, Clone)]
pub struct SqlTable {
    pool: sqlx::Pool<sqlx::Sqlite>,
    flags: u64,
}

impl SqlTable {
    pub async fn open(path: impl AsRef<Path>, flags: u64) -> crate::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(flags & FLAG_CREATE != 0);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT NOT NULL)")
            .execute(&pool)
            .await?;
        Ok(SqlTable {
            pool,
            flags: flags | FLAG_DUP_REPLACE | FLAG_SYNC_UPDATE,
        })
    }

    pub async fn get(&self, key: &str) -> crate::Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT v FROM kv WHERE k = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn put(&self, key: &str, value: &str) -> crate::Result<()> {
        sqlx::query("INSERT INTO kv (k, v) VALUES (?, ?) ON CONFLICT(k) DO UPDATE SET v = excluded.v")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    pub async fn del(&self, key: &str) -> crate::Result<()> {
        sqlx::query("DELETE FROM kv WHERE k = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::SqlTable;
    use crate::FLAG_CREATE;

    #[tokio::test]
    async fn sql_round_trip() {
        let dir = std::env::temp_dir().join("store_sql_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kv.db");
        let _ = std::fs::remove_file(&path);

        let table = SqlTable::open(&path, FLAG_CREATE).await.unwrap();
        assert_eq!(table.get("user@example.org").await.unwrap(), None);
        table.put("user@example.org", "0:0:100:250 ok").await.unwrap();
        assert_eq!(
            table.get("user@example.org").await.unwrap(),
            Some("0:0:100:250 ok".to_string())
        );
        table.put("user@example.org", "5:0:200:550 no").await.unwrap();
        assert_eq!(
            table.get("user@example.org").await.unwrap(),
            Some("5:0:200:550 no".to_string())
        );
        table.del("user@example.org").await.unwrap();
        assert_eq!(table.get("user@example.org").await.unwrap(), None);

        // Reopening reads the same file.
        table.put("other@example.org", "value").await.unwrap();
        drop(table);
        let table = SqlTable::open(&path, 0).await.unwrap();
        assert_eq!(
            table.get("other@example.org").await.unwrap(),
            Some("value".to_string())
        );
    }

    #[tokio::test]
    async fn open_without_create() {
        assert!(SqlTable::open("/nonexistent/dir/kv.db", 0).await.is_err());
    }
}
