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

use proxymap::{session::ProxySessionManager, ProxyCore};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
};
use utils::{config::Config, enable_tracing, listener::UnixServer, UnwrapFailure};
use verify::{probe::ProbeQueue, session::VerifySessionManager, VerifyCore};

/// Services are enabled by configuring their socket path. The intended
/// deployment unit is one service per process so the supervisor can restart
/// each daemon independently, but nothing prevents running both from one
/// configuration.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config::init();
    let _tracing_guard = enable_tracing(&config).failed("Invalid configuration file");

    let use_limit = config
        .property_or_static::<u64>("server.use-limit", "100")
        .failed("Invalid configuration file");
    let idle_limit = config
        .property_or_static::<std::time::Duration>("server.idle-limit", "100s")
        .failed("Invalid configuration file")
        .as_secs();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(path) = config.value("server.verify.path") {
        // Pre-jail: the backing table opens before privileges would drop,
        // and the process leaves its process group.
        let queue = ProbeQueue::spool(config.value_or_default("queue.path", "/var/spool/mail-tables"));
        let core = Arc::new(
            VerifyCore::init(&config, queue)
                .await
                .failed("Failed to start address verification service"),
        );
        let instance = UnixServer::new("verify", path)
            .with_limits(use_limit, idle_limit)
            .spawn(VerifySessionManager::new(core.clone()), shutdown_rx.clone())?;
        // Post-jail: a memory-backed cache disables process recycling.
        core.post_jail_init(&instance);
    }

    if let Some(path) = config.value("server.proxymap.path") {
        let core = Arc::new(ProxyCore::post_jail_init(&config));
        UnixServer::new("proxymap", path)
            .with_limits(use_limit, idle_limit)
            .spawn(ProxySessionManager::new(core), shutdown_rx.clone())?;
    }

    // Wait for shutdown signal
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    };

    tracing::info!(
        context = "server",
        event = "shutdown",
        "Shutting down."
    );
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    Ok(())
}
