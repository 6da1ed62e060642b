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

//! Probe submission into the mail queue.
//!
//! A probe message is routed and rewritten like ordinary mail but carries
//! the verify request flag, so the queue manager reports its fate back
//! instead of delivering it. Submission is synchronous from the cache's
//! point of view: a `false` return means nothing was queued and the caller
//! must not record a probe as outstanding.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Clone)]
pub enum ProbeQueue {
    Spool(SpoolQueue),
    Memory(MemoryQueue),
}

impl ProbeQueue {
    pub fn spool(path: impl Into<PathBuf>) -> Self {
        ProbeQueue::Spool(SpoolQueue {
            path: path.into(),
            seq: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn memory() -> Self {
        ProbeQueue::Memory(MemoryQueue::default())
    }

    pub async fn submit(&self, sender: &str, recipient: &str) -> bool {
        match self {
            ProbeQueue::Spool(queue) => queue.submit(sender, recipient).await,
            ProbeQueue::Memory(queue) => queue.submit(sender, recipient),
        }
    }
}

/// Queue injection through a spool directory watched by the queue manager.
#[derive(Debug, Clone)]
pub struct SpoolQueue {
    path: PathBuf,
    seq: Arc<AtomicU64>,
}

impl SpoolQueue {
    async fn submit(&self, sender: &str, recipient: &str) -> bool {
        let envelope = format!(
            "from={}\nto=<{}>\nflags=verify\nrewrite=none\n\n",
            normalize_sender(sender),
            recipient
        );
        let name = format!(
            "{:x}{:08x}",
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_path = self.path.join(format!("{name}.tmp"));
        let msg_path = self.path.join(format!("{name}.msg"));

        // Write the whole envelope to a scratch file, then commit it with a
        // rename so the queue manager never sees a partial probe.
        let result: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(envelope.as_bytes()).await?;
            file.flush().await?;
            tokio::fs::rename(&tmp_path, &msg_path).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    context = "queue",
                    event = "probe",
                    from = normalize_sender(sender),
                    rcpt = recipient,
                    "Verification probe queued."
                );
                true
            }
            Err(err) => {
                tracing::error!(
                    context = "queue",
                    event = "error",
                    rcpt = recipient,
                    "Failed to queue probe in {}: {}",
                    self.path.display(),
                    err
                );
                let _ = tokio::fs::remove_file(&tmp_path).await;
                false
            }
        }
    }
}

/// In-process queue that records submissions, used by the test suites.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    submitted: Arc<Mutex<Vec<Probe>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryQueue {
    fn submit(&self, sender: &str, recipient: &str) -> bool {
        if self.fail.load(Ordering::Relaxed) {
            return false;
        }
        self.submitted.lock().push(Probe {
            sender: normalize_sender(sender).to_string(),
            recipient: recipient.to_string(),
        });
        true
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> Vec<Probe> {
        self.submitted.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.lock().is_empty()
    }
}

/// The empty string and the literal `<>` both mean the null sender.
fn normalize_sender(sender: &str) -> &str {
    if sender.is_empty() || sender == "<>" {
        "<>"
    } else {
        sender
    }
}
