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

//! Typed attribute stream framing.
//!
//! A frame is a sequence of `name=value` lines terminated by an empty line.
//! Values are free-form text without line breaks; numeric attributes are
//! decimal. The first attribute of a request frame names the request.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::ATTR_REQUEST;

/// Attribute lines longer than this are rejected before the full line is
/// buffered.
pub const MAX_ATTR_LINE: usize = 4096;

/// Upper bound on attributes per frame.
pub const MAX_FRAME_ATTRS: usize = 64;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AttrFrame {
    attrs: Vec<(String, String)>,
}

impl AttrFrame {
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_num(&self, name: &str) -> Option<u64> {
        self.get_str(name).and_then(|value| value.parse().ok())
    }

    /// The request name, required to be the first attribute of the frame.
    pub fn request(&self) -> Option<&str> {
        self.attrs
            .first()
            .filter(|(name, _)| name == ATTR_REQUEST)
            .map(|(_, value)| value.as_str())
    }

    /// Strict attribute extraction: the frame must carry exactly the request
    /// attribute followed by `names`, in any order and without extras.
    pub fn expect<const N: usize>(&self, names: [&str; N]) -> Option<[&str; N]> {
        if self.attrs.len() != N + 1 {
            return None;
        }
        let mut values = [""; N];
        for (idx, name) in names.into_iter().enumerate() {
            values[idx] = self.get_str(name)?;
        }
        Some(values)
    }
}

/// Read one frame. Returns `None` on a clean end of stream before the first
/// attribute; a stream that ends mid-frame is an error.
pub async fn read_frame<T: AsyncBufRead + Unpin>(stream: &mut T) -> io::Result<Option<AttrFrame>> {
    let mut attrs = Vec::new();
    loop {
        let line = match read_bounded_line(stream).await? {
            Some(line) => line,
            None if attrs.is_empty() => return Ok(None),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ));
            }
        };
        if line.is_empty() {
            if attrs.is_empty() {
                return Err(invalid("empty frame"));
            }
            return Ok(Some(AttrFrame { attrs }));
        }
        if attrs.len() == MAX_FRAME_ATTRS {
            return Err(invalid("too many attributes"));
        }
        let (name, value) = line.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        if name.is_empty() {
            return Err(invalid("empty attribute name"));
        }
        attrs.push((name.to_string(), value.to_string()));
    }
}

/// Write one frame and flush. Values carrying a line break cannot be framed
/// and surface as `InvalidData`, which callers treat as an internal
/// consistency failure rather than a client error.
pub async fn write_frame<T: AsyncWrite + Unpin>(
    stream: &mut T,
    attrs: &[(&str, &str)],
) -> io::Result<()> {
    let mut frame = String::with_capacity(64);
    for (name, value) in attrs {
        if value.contains('\n') || value.contains('\r') || name.contains('=') {
            return Err(invalid("unframeable attribute"));
        }
        frame.push_str(name);
        frame.push('=');
        frame.push_str(value);
        frame.push('\n');
    }
    frame.push('\n');
    stream.write_all(frame.as_bytes()).await?;
    stream.flush().await
}

/// Read a single `\n`-terminated line with a length bound enforced while
/// filling the buffer. Returns `None` on end of stream before the first byte.
async fn read_bounded_line<T: AsyncBufRead + Unpin>(
    stream: &mut T,
) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        let (consumed, done) = {
            let buf = stream.fill_buf().await?;
            if buf.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-line",
                ));
            }
            match buf.iter().position(|&ch| ch == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&buf[..pos]);
                    (pos + 1, true)
                }
                None => {
                    line.extend_from_slice(buf);
                    (buf.len(), false)
                }
            }
        };
        stream.consume(consumed);
        if line.len() > MAX_ATTR_LINE {
            return Err(invalid("attribute line too long"));
        }
        if done {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return String::from_utf8(line)
                .map(Some)
                .map_err(|_| invalid("attribute line is not valid UTF-8"));
        }
    }
}

fn invalid(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}
