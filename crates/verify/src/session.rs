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
    VrfyStat, ATTR_ADDRESS, ATTR_ADDRESS_STATUS, ATTR_REASON, ATTR_STATUS, VRFY_REQ_QUERY,
    VRFY_REQ_UPDATE,
};
use tokio::{io::BufStream, net::UnixStream};
use tracing::Instrument;
use utils::listener::{SessionData, SessionManager};

use crate::VerifyCore;

#[derive(Clone)]
pub struct VerifySessionManager {
    pub core: Arc<VerifyCore>,
}

impl VerifySessionManager {
    pub fn new(core: Arc<VerifyCore>) -> Self {
        VerifySessionManager { core }
    }
}

impl SessionManager for VerifySessionManager {
    fn spawn(&self, session: SessionData) {
        let core = self.core.clone();
        tokio::spawn(async move {
            let span = session.span.clone();
            let _in_flight = session.in_flight;
            handle(core, session.stream).instrument(span).await;
        });
    }
}

/// Serve one client. Each connection carries exactly one request; the
/// connection is handed back to the accept loop by returning.
async fn handle(core: Arc<VerifyCore>, stream: UnixStream) {
    let mut stream = BufStream::new(stream);
    let frame = match read_frame(&mut stream).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(err) if err.kind() == ErrorKind::InvalidData => {
            tracing::warn!(
                context = "verify",
                event = "bad-request",
                reason = %err,
                "Malformed request frame."
            );
            reply_status(&mut stream, VrfyStat::Bad).await;
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
        Some(VRFY_REQ_QUERY) => query_service(&core, &frame, &mut stream).await,
        Some(VRFY_REQ_UPDATE) => update_service(&core, &frame, &mut stream).await,
        request => {
            tracing::warn!(
                context = "verify",
                event = "bad-request",
                request = request.unwrap_or_default(),
                "Unrecognized request, ignored."
            );
            reply_status(&mut stream, VrfyStat::Bad).await;
        }
    }
}

async fn query_service(
    core: &VerifyCore,
    frame: &AttrFrame,
    stream: &mut BufStream<UnixStream>,
) {
    let Some([address]) = frame.expect([ATTR_ADDRESS]) else {
        reply_status(stream, VrfyStat::Bad).await;
        return;
    };
    let now = utils::now();
    let reply = core.query(address, now).await;

    let status = VrfyStat::Ok.code().to_string();
    let addr_status = reply.status.code().to_string();
    write_reply(
        stream,
        &[
            (ATTR_STATUS, status.as_str()),
            (ATTR_ADDRESS_STATUS, addr_status.as_str()),
            (ATTR_REASON, reply.text.as_str()),
        ],
    )
    .await;

    // The probe goes out after the client has its answer.
    if let Some(entry) = &reply.refresh {
        core.refresh(address, entry, now).await;
    }
}

async fn update_service(
    core: &VerifyCore,
    frame: &AttrFrame,
    stream: &mut BufStream<UnixStream>,
) {
    let Some([address, addr_status, reason]) =
        frame.expect([ATTR_ADDRESS, ATTR_ADDRESS_STATUS, ATTR_REASON])
    else {
        reply_status(stream, VrfyStat::Bad).await;
        return;
    };
    let status = match addr_status.parse::<u64>() {
        Ok(code) => core.update(address, code, reason, utils::now()).await,
        Err(_) => {
            tracing::warn!(
                context = "verify",
                event = "bad-request",
                address = address,
                status = addr_status,
                "Malformed recipient status."
            );
            VrfyStat::Bad
        }
    };
    reply_status(stream, status).await;
}

async fn reply_status(stream: &mut BufStream<UnixStream>, status: VrfyStat) {
    let status = status.code().to_string();
    write_reply(stream, &[(ATTR_STATUS, status.as_str())]).await;
}

async fn write_reply(stream: &mut BufStream<UnixStream>, attrs: &[(&str, &str)]) {
    if let Err(err) = write_frame(stream, attrs).await {
        if err.kind() == ErrorKind::InvalidData {
            tracing::error!(
                context = "verify",
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
