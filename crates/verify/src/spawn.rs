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

use std::{sync::atomic::Ordering, time::Duration};

use store::{Table, FLAG_CREATE, FLAG_DUP_REPLACE, FLAG_SYNC_UPDATE};
use utils::{config::Config, listener::ServerInstance, UmaskGuard};

use crate::{probe::ProbeQueue, VerifyConfig, VerifyCore};

pub const DEFAULT_SENDER: &str = "postmaster";

impl VerifyCore {
    /// Pre-jail initialization. The backing table is opened while the
    /// process still holds its starting privileges: a configured map is
    /// opened read-write with create-if-missing under a temporary 022
    /// umask, an empty setting keeps the state in volatile memory. The
    /// process then detaches from its process group so a supervisor-wide
    /// stop signal cannot interrupt a database update in progress.
    pub async fn init(config: &Config, queue: ProbeQueue) -> utils::config::Result<VerifyCore> {
        let verify_config = VerifyConfig::parse(config)?;
        let map = if !verify_config.map_ref.is_empty() {
            let _umask = UmaskGuard::set(0o022);
            Table::open(
                &verify_config.map_ref,
                FLAG_CREATE | FLAG_DUP_REPLACE | FLAG_SYNC_UPDATE,
            )
            .await
        } else {
            Table::open("memory:verify", FLAG_DUP_REPLACE).await
        }
        .map_err(|err| {
            format!(
                "Failed to open address verify map {:?}: {err}",
                verify_config.map_ref
            )
        })?;
        utils::detach_process_group();

        Ok(VerifyCore {
            map,
            queue,
            config: verify_config,
        })
    }

    /// Post-jail initialization. When the database lives in volatile memory
    /// only, automatic process recycling after a number of client requests
    /// or an idle period would lose it, so both limits are disabled.
    pub fn post_jail_init(&self, instance: &ServerInstance) {
        if self.config.map_ref.is_empty() {
            instance.use_limit.store(0, Ordering::Relaxed);
            instance.idle_limit.store(0, Ordering::Relaxed);
        }
    }
}

impl VerifyConfig {
    pub fn parse(config: &Config) -> utils::config::Result<Self> {
        Ok(VerifyConfig {
            map_ref: config.value_or_default("address_verify_map", "").to_string(),
            sender: config
                .value_or_default("address_verify_sender", DEFAULT_SENDER)
                .to_string(),
            positive_expire: config
                .property_or_static::<Duration>("address_verify_positive_expire_time", "31d")?
                .as_secs(),
            positive_refresh: config
                .property_or_static::<Duration>("address_verify_positive_refresh_time", "7d")?
                .as_secs(),
            negative_expire: config
                .property_or_static::<Duration>("address_verify_negative_expire_time", "3d")?
                .as_secs(),
            negative_refresh: config
                .property_or_static::<Duration>("address_verify_negative_refresh_time", "3h")?
                .as_secs(),
            negative_cache: config
                .property_or_static::<bool>("address_verify_negative_cache", "yes")?,
        })
    }
}
