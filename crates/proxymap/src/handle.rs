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

use mail_proto::ProxyStat;
use store::Table;

use crate::ProxyCore;

impl ProxyCore {
    /// Look up or open a table. One handle is opened per `type:name` and
    /// flag combination and shared by every later request for it.
    pub async fn find_table(&self, table: &str, flags: u64) -> Result<Table, ProxyStat> {
        let name = self.check_access(table)?;

        // The proxy serves reads only; a client cannot make it create
        // tables on disk.
        let flags = flags & !store::FLAG_CREATE;
        let key = format!("{}:{:o}", name, flags);
        if let Some(handle) = self.handles.lock().get(&key) {
            return Ok(handle.clone());
        }

        match Table::open(name, flags).await {
            Ok(handle) => {
                tracing::debug!(
                    context = "proxymap",
                    event = "open",
                    table = name,
                    flags = flags,
                    "Opened table."
                );
                Ok(self.handles.lock().entry(key).or_insert(handle).clone())
            }
            Err(err) => {
                // An approved table that cannot be opened is an internal
                // inconsistency; exit so the supervisor restarts the
                // process with fresh state.
                tracing::error!(
                    context = "proxymap",
                    event = "error",
                    table = name,
                    reason = %err,
                    "Failed to open approved table."
                );
                utils::failed(&format!("Failed to open approved table {name:?}: {err}"));
            }
        }
    }

    /// Whether any opened table changed on disk since it was opened.
    pub fn tables_changed(&self) -> bool {
        self.handles.lock().values().any(|handle| handle.has_changed())
    }
}
