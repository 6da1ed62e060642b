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

use std::{io::ErrorKind, sync::Arc};

use mail_proto::{
    attr::{read_frame, write_frame, AttrFrame},
    ProxyStat, ATTR_FLAGS, ATTR_KEY, ATTR_STATUS, ATTR_TABLE, ATTR_VALUE, PROXY_REQ_LOOKUP,
    PROXY_REQ_OPEN,
};
use tokio::{io::BufStream, net::UnixStream};
use tracing::Instrument;
use utils::listener::{SessionData, SessionManager};

use crate::ProxyCore;

#[derive(Clone)]
pub struct ProxySessionManager {
    pub core: Arc<ProxyCore>,
}

impl ProxySessionManager {
    pub fn new(core: Arc<ProxyCore>) -> Self {
        ProxySessionManager { core }
    }
}

impl SessionManager for ProxySessionManager {
    /// Poll the cached handles before every accept; when a table was
    /// rebuilt on disk, the process exits cleanly so the supervisor starts
    /// a replacement that opens everything afresh.
    fn pre_accept(&self) -> bool {
        if self.core.tables_changed() {
            tracing::info!(
                context = "proxymap",
                event = "restart",
                "A lookup table has changed, restarting."
            );
            false
        } else {
            true
        }
    }

    fn spawn(&self, session: SessionData) {
        let core = self.core.clone();
        tokio::spawn(async move {
            let span = session.span.clone();
            let _in_flight = session.in_flight;
            handle(core, session.stream).instrument(span).await;
        });
    }
}

/// Serve one client. Handle sharing is the point of this service, so a
/// connection carries any number of requests.
async fn handle(core: Arc<ProxyCore>, stream: UnixStream) {
    let mut stream = BufStream::new(stream);
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                tracing::warn!(
                    context = "proxymap",
                    event = "bad-request",
                    reason = %err,
                    "Malformed request frame."
                );
                reply_status(&mut stream, ProxyStat::Bad).await;
                return;
            }
            Err(err) => {
                tracing::debug!(
                    context = "io",
                    event = "error",
                    reason = %err,
                    "Failed to read request."
                );
                return;
            }
        };

        match frame.request() {
            Some(PROXY_REQ_LOOKUP) => lookup_service(&core, &frame, &mut stream).await,
            Some(PROXY_REQ_OPEN) => open_service(&core, &frame, &mut stream).await,
            request => {
                tracing::warn!(
                    context = "proxymap",
                    event = "bad-request",
                    request = request.unwrap_or_default(),
                    "Unrecognized request, ignored."
                );
                reply_status(&mut stream, ProxyStat::Bad).await;
            }
        }
    }
}

async fn lookup_service(
    core: &ProxyCore,
    frame: &AttrFrame,
    stream: &mut BufStream<UnixStream>,
) {
    let (status, value) = match frame
        .expect([ATTR_TABLE, ATTR_FLAGS, ATTR_KEY])
        .and_then(|[table, flags, key]| flags.parse::<u64>().ok().map(|f| (table, f, key)))
    {
        Some((table, flags, key)) => match core.find_table(table, flags).await {
            Ok(handle) => match handle.get(key).await {
                Ok(Some(value)) => (ProxyStat::Ok, value),
                Ok(None) => (ProxyStat::NoKey, String::new()),
                Err(err) => {
                    tracing::warn!(
                        context = "proxymap",
                        event = "error",
                        table = table,
                        reason = %err,
                        "Table lookup failed."
                    );
                    (ProxyStat::Retry, String::new())
                }
            },
            Err(status) => (status, String::new()),
        },
        None => (ProxyStat::Bad, String::new()),
    };

    let status = status.code().to_string();
    write_reply(
        stream,
        &[
            (ATTR_STATUS, status.as_str()),
            (ATTR_VALUE, value.as_str()),
        ],
    )
    .await;
}

async fn open_service(core: &ProxyCore, frame: &AttrFrame, stream: &mut BufStream<UnixStream>) {
    let (status, flags) = match frame
        .expect([ATTR_TABLE, ATTR_FLAGS])
        .and_then(|[table, flags]| flags.parse::<u64>().ok().map(|f| (table, f)))
    {
        Some((table, flags)) => match core.find_table(table, flags).await {
            Ok(handle) => (ProxyStat::Ok, handle.flags()),
            Err(status) => (status, 0),
        },
        None => (ProxyStat::Bad, 0),
    };

    let status = status.code().to_string();
    let flags = flags.to_string();
    write_reply(
        stream,
        &[
            (ATTR_STATUS, status.as_str()),
            (ATTR_FLAGS, flags.as_str()),
        ],
    )
    .await;
}

async fn reply_status(stream: &mut BufStream<UnixStream>, status: ProxyStat) {
    let status = status.code().to_string();
    write_reply(stream, &[(ATTR_STATUS, status.as_str())]).await;
}

async fn write_reply(stream: &mut BufStream<UnixStream>, attrs: &[(&str, &str)]) {
    if let Err(err) = write_frame(stream, attrs).await {
        if err.kind() == ErrorKind::InvalidData {
            tracing::error!(
                context = "proxymap",
                event = "error",
                reason = %err,
                "Failed to serialize reply."
            );
            utils::failed("Reply serialization failed");
        }
        tracing::debug!(
            context = "io",
            event = "error",
            reason = %err,
            "Failed to write reply."
        );
    }
}
