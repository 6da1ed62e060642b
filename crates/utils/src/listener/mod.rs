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
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    net::{UnixListener, UnixStream},
    sync::watch,
};

/// A service accept loop on a local stream socket. Connection management is
/// handled here; services only see accepted sessions. The use and idle limits
/// recycle the process the way the supervising skeleton expects: the process
/// exits cleanly and the supervisor starts a fresh one on demand. Both limits
/// can be zeroed at runtime (a zero limit never triggers).
pub struct ServerInstance {
    pub id: String,
    pub path: PathBuf,
    pub use_limit: AtomicU64,
    pub idle_limit: AtomicU64,
    pub active: AtomicU64,
}

pub struct SessionData {
    pub stream: UnixStream,
    pub span: tracing::Span,
    pub in_flight: InFlight,
}

pub trait SessionManager: Send + Sync + Clone + 'static {
    /// Invoked before every accept. Returning `false` shuts the process down
    /// cleanly so the supervisor can start a replacement.
    fn pre_accept(&self) -> bool {
        true
    }

    fn spawn(&self, session: SessionData);
}

/// Session guard held by the connection task for its lifetime.
pub struct InFlight {
    instance: Arc<ServerInstance>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.instance.active.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct UnixServer {
    pub id: String,
    pub path: PathBuf,
    pub use_limit: u64,
    pub idle_limit: u64,
}

impl UnixServer {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        UnixServer {
            id: id.into(),
            path: path.into(),
            use_limit: 0,
            idle_limit: 0,
        }
    }

    pub fn with_limits(mut self, use_limit: u64, idle_limit: u64) -> Self {
        self.use_limit = use_limit;
        self.idle_limit = idle_limit;
        self
    }

    pub fn spawn(
        self,
        manager: impl SessionManager,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<Arc<ServerInstance>> {
        // Remove a stale socket left behind by a previous instance.
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.path)?;

        let instance = Arc::new(ServerInstance {
            id: self.id,
            path: self.path,
            use_limit: AtomicU64::new(self.use_limit),
            idle_limit: AtomicU64::new(self.idle_limit),
            active: AtomicU64::new(0),
        });

        tracing::info!(
            context = "listener",
            event = "start",
            instance = instance.id,
            path = %instance.path.display(),
            "Starting listener"
        );

        let handle = instance.clone();
        tokio::spawn(async move {
            let mut served: u64 = 0;
            loop {
                if !manager.pre_accept() {
                    drain_and_exit(&handle).await;
                }
                let use_limit = handle.use_limit.load(Ordering::Relaxed);
                if use_limit != 0 && served >= use_limit {
                    tracing::info!(
                        context = "listener",
                        event = "use-limit",
                        instance = handle.id,
                        served = served,
                        "Client request limit reached, exiting."
                    );
                    drain_and_exit(&handle).await;
                }
                let idle_limit = handle.idle_limit.load(Ordering::Relaxed);

                tokio::select! {
                    stream = listener.accept() => {
                        match stream {
                            Ok((stream, _addr)) => {
                                served += 1;
                                handle.active.fetch_add(1, Ordering::Relaxed);
                                let span = tracing::info_span!(
                                    "session",
                                    instance = handle.id,
                                );
                                manager.spawn(SessionData {
                                    stream,
                                    span,
                                    in_flight: InFlight {
                                        instance: handle.clone(),
                                    },
                                });
                            }
                            Err(err) => {
                                tracing::debug!(
                                    context = "io",
                                    event = "error",
                                    instance = handle.id,
                                    "Failed to accept connection: {}", err);
                            }
                        }
                    },
                    _ = tokio::time::sleep(Duration::from_secs(idle_limit)), if idle_limit != 0 => {
                        tracing::info!(
                            context = "listener",
                            event = "idle-limit",
                            instance = handle.id,
                            "Idle limit reached, exiting."
                        );
                        drain_and_exit(&handle).await;
                    },
                    _ = shutdown_rx.changed() => {
                        tracing::debug!(
                            context = "listener",
                            event = "shutdown",
                            instance = handle.id,
                            "Listener shutting down.");
                        let _ = std::fs::remove_file(&handle.path);
                        break;
                    }
                };
            }
        });

        Ok(instance)
    }
}

/// Wait for in-flight sessions to complete, then exit so the supervisor
/// starts a fresh process.
async fn drain_and_exit(instance: &Arc<ServerInstance>) -> ! {
    while instance.active.load(Ordering::Relaxed) != 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let _ = std::fs::remove_file(&instance.path);
    std::process::exit(0);
}
