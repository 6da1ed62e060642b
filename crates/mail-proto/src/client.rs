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

//! Client side of the attribute stream protocol.

use std::{io, path::Path};

use tokio::{io::BufStream, net::UnixStream};

use crate::{
    attr::{read_frame, write_frame, AttrFrame},
    AddrStatus, ProxyStat, VrfyStat, ATTR_ADDRESS, ATTR_ADDRESS_STATUS, ATTR_FLAGS, ATTR_KEY,
    ATTR_REASON, ATTR_REQUEST, ATTR_STATUS, ATTR_TABLE, ATTR_VALUE, PROXY_REQ_LOOKUP,
    PROXY_REQ_OPEN, VRFY_REQ_QUERY, VRFY_REQ_UPDATE,
};

/// One-shot client for the verification service, which serves a single
/// request per connection.
pub struct VerifyClient {
    stream: BufStream<UnixStream>,
}

impl VerifyClient {
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(VerifyClient {
            stream: BufStream::new(UnixStream::connect(path).await?),
        })
    }

    pub async fn query(mut self, address: &str) -> io::Result<(VrfyStat, AddrStatus, String)> {
        write_frame(
            &mut self.stream,
            &[(ATTR_REQUEST, VRFY_REQ_QUERY), (ATTR_ADDRESS, address)],
        )
        .await?;
        let frame = read_reply(&mut self.stream).await?;
        let status = reply_status(&frame, VrfyStat::from_code)?;
        let addr_status = frame
            .get_num(ATTR_ADDRESS_STATUS)
            .and_then(AddrStatus::from_code)
            .ok_or_else(|| protocol_error("missing address status in reply"))?;
        let reason = frame.get_str(ATTR_REASON).unwrap_or_default().to_string();
        Ok((status, addr_status, reason))
    }

    pub async fn update(
        mut self,
        address: &str,
        status: AddrStatus,
        reason: &str,
    ) -> io::Result<VrfyStat> {
        write_frame(
            &mut self.stream,
            &[
                (ATTR_REQUEST, VRFY_REQ_UPDATE),
                (ATTR_ADDRESS, address),
                (ATTR_ADDRESS_STATUS, status.code().to_string().as_str()),
                (ATTR_REASON, reason),
            ],
        )
        .await?;
        let frame = read_reply(&mut self.stream).await?;
        reply_status(&frame, VrfyStat::from_code)
    }
}

/// Long-lived client for the table proxy service; a single connection
/// carries any number of requests.
pub struct ProxyClient {
    stream: BufStream<UnixStream>,
}

impl ProxyClient {
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(ProxyClient {
            stream: BufStream::new(UnixStream::connect(path).await?),
        })
    }

    pub async fn open(&mut self, table: &str, flags: u64) -> io::Result<(ProxyStat, u64)> {
        write_frame(
            &mut self.stream,
            &[
                (ATTR_REQUEST, PROXY_REQ_OPEN),
                (ATTR_TABLE, table),
                (ATTR_FLAGS, flags.to_string().as_str()),
            ],
        )
        .await?;
        let frame = read_reply(&mut self.stream).await?;
        let status = reply_status(&frame, ProxyStat::from_code)?;
        Ok((status, frame.get_num(ATTR_FLAGS).unwrap_or(0)))
    }

    pub async fn lookup(
        &mut self,
        table: &str,
        flags: u64,
        key: &str,
    ) -> io::Result<(ProxyStat, String)> {
        write_frame(
            &mut self.stream,
            &[
                (ATTR_REQUEST, PROXY_REQ_LOOKUP),
                (ATTR_TABLE, table),
                (ATTR_FLAGS, flags.to_string().as_str()),
                (ATTR_KEY, key),
            ],
        )
        .await?;
        let frame = read_reply(&mut self.stream).await?;
        let status = reply_status(&frame, ProxyStat::from_code)?;
        Ok((
            status,
            frame.get_str(ATTR_VALUE).unwrap_or_default().to_string(),
        ))
    }
}

async fn read_reply(stream: &mut BufStream<UnixStream>) -> io::Result<AttrFrame> {
    read_frame(stream)
        .await?
        .ok_or_else(|| protocol_error("connection closed before reply"))
}

fn reply_status<T>(frame: &AttrFrame, from_code: impl Fn(u64) -> Option<T>) -> io::Result<T> {
    frame
        .get_num(ATTR_STATUS)
        .and_then(from_code)
        .ok_or_else(|| protocol_error("missing status in reply"))
}

fn protocol_error(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}
