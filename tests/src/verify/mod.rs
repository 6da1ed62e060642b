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

use std::{sync::Arc, time::Duration};

use mail_proto::{
    attr::{read_frame, write_frame},
    client::VerifyClient,
    AddrStatus, VrfyStat, ATTR_STATUS,
};
use store::{memory::MemoryTable, Table};
use tokio::{io::BufStream, net::UnixStream, sync::watch};
use utils::{config::Config, listener::UnixServer};
use verify::{
    cache::IN_PROGRESS,
    entry::Entry,
    probe::{MemoryQueue, ProbeQueue},
    session::VerifySessionManager,
    VerifyConfig, VerifyCore,
};

use crate::test_dir;

struct TestCache {
    core: VerifyCore,
    probes: MemoryQueue,
}

fn test_cache(config: VerifyConfig) -> TestCache {
    let probes = MemoryQueue::default();
    TestCache {
        core: VerifyCore {
            map: Table::Memory(MemoryTable::open(0)),
            queue: ProbeQueue::Memory(probes.clone()),
            config,
        },
        probes,
    }
}

impl TestCache {
    /// Query and refresh the way the service handler does, with an
    /// injected clock.
    async fn query(&self, address: &str, now: u64) -> (AddrStatus, String) {
        let reply = self.core.query(address, now).await;
        if let Some(entry) = &reply.refresh {
            self.core.refresh(address, entry, now).await;
        }
        (reply.status, reply.text)
    }

    async fn stored(&self, address: &str) -> Option<Entry> {
        self.core
            .map
            .get(address)
            .await
            .unwrap()
            .map(|raw| Entry::parse(&raw).unwrap())
    }
}

#[tokio::test]
async fn probe_cycle() {
    let cache = test_cache(VerifyConfig {
        positive_refresh: 3600,
        ..VerifyConfig::default()
    });

    // Cold query: nothing is known, a probe goes out and the pending state
    // is recorded.
    assert_eq!(
        cache.query("u@x", 100).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(cache.probes.len(), 1);
    assert_eq!(cache.probes.submitted()[0].recipient, "u@x");
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Todo, 100, 0, IN_PROGRESS))
    );

    // A second query while the probe is outstanding does not probe again.
    assert_eq!(
        cache.query("u@x", 105).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(cache.probes.len(), 1);
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Todo, 100, 0, IN_PROGRESS))
    );

    // The probe result arrives.
    assert_eq!(
        cache
            .core
            .update("u@x", AddrStatus::Ok.code(), "250 ok", 110)
            .await,
        VrfyStat::Ok
    );
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Ok, 0, 110, "250 ok"))
    );

    // A failing probe result cannot clobber the OK entry before it expires.
    assert_eq!(
        cache
            .core
            .update("u@x", AddrStatus::Defer.code(), "451 try later", 120)
            .await,
        VrfyStat::Ok
    );
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Ok, 0, 110, "250 ok"))
    );

    // Past the refresh threshold the cached answer is still served, one
    // proactive probe goes out and the outstanding time is recorded.
    assert_eq!(
        cache.query("u@x", 4000).await,
        (AddrStatus::Ok, "250 ok".to_string())
    );
    assert_eq!(cache.probes.len(), 2);
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Ok, 4000, 110, "250 ok"))
    );

    // No second refresh probe while the first is outstanding.
    assert_eq!(
        cache.query("u@x", 4500).await,
        (AddrStatus::Ok, "250 ok".to_string())
    );
    assert_eq!(cache.probes.len(), 2);
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Ok, 4000, 110, "250 ok"))
    );
}

#[tokio::test]
async fn negative_cache_disabled() {
    let cache = test_cache(VerifyConfig {
        negative_cache: false,
        negative_expire: 200,
        negative_refresh: 100,
        ..VerifyConfig::default()
    });

    // A query miss probes but persists nothing.
    assert_eq!(
        cache.query("u@x", 100).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(cache.probes.len(), 1);
    assert_eq!(cache.stored("u@x").await, None);

    // Without a record of the outstanding probe, every miss probes again.
    cache.query("u@x", 150).await;
    assert_eq!(cache.probes.len(), 2);
    assert_eq!(cache.stored("u@x").await, None);

    // Probe results are stored regardless.
    cache
        .core
        .update("u@x", AddrStatus::Bounce.code(), "550 no such user", 300)
        .await;
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Bounce, 0, 300, "550 no such user"))
    );

    // While valid, the negative entry is served.
    assert_eq!(
        cache.query("u@x", 350).await,
        (AddrStatus::Bounce, "550 no such user".to_string())
    );

    // Once expired it is purged from the store on the next query.
    assert_eq!(
        cache.query("u@x", 600).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(cache.stored("u@x").await, None);
}

#[tokio::test]
async fn positive_entry_expires() {
    let cache = test_cache(VerifyConfig {
        positive_expire: 500,
        ..VerifyConfig::default()
    });
    cache
        .core
        .update("u@x", AddrStatus::Ok.code(), "250 ok", 110)
        .await;

    // Before expiry the entry is served as is.
    assert_eq!(
        cache.query("u@x", 600).await,
        (AddrStatus::Ok, "250 ok".to_string())
    );

    // After expiry the address is unknown again and a probe goes out.
    assert_eq!(
        cache.query("u@x", 700).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Todo, 700, 0, IN_PROGRESS))
    );
}

#[tokio::test]
async fn failed_submission_changes_nothing() {
    let cache = test_cache(VerifyConfig::default());
    cache.probes.set_fail(true);

    assert_eq!(
        cache.query("u@x", 100).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert!(cache.probes.is_empty());
    assert_eq!(cache.stored("u@x").await, None);

    // Submission works again: the probe is recorded this time.
    cache.probes.set_fail(false);
    cache.query("u@x", 200).await;
    assert_eq!(cache.probes.len(), 1);
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Todo, 200, 0, IN_PROGRESS))
    );
}

#[tokio::test]
async fn malformed_entry_restarts_probing() {
    let cache = test_cache(VerifyConfig::default());
    cache.core.map.put("u@x", "not a cache entry").await.unwrap();

    assert_eq!(
        cache.query("u@x", 2000).await,
        (AddrStatus::Todo, IN_PROGRESS.to_string())
    );
    assert_eq!(cache.probes.len(), 1);
    assert_eq!(
        cache.stored("u@x").await,
        Some(Entry::new(AddrStatus::Todo, 2000, 0, IN_PROGRESS))
    );
}

#[tokio::test]
async fn verify_service_over_socket() {
    let dir = test_dir("verify_socket");
    let socket_path = dir.join("verify.sock");

    let probes = MemoryQueue::default();
    let core = Arc::new(VerifyCore {
        map: Table::Memory(MemoryTable::open(0)),
        queue: ProbeQueue::Memory(probes.clone()),
        config: VerifyConfig::default(),
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let instance = UnixServer::new("verify", &socket_path)
        .with_limits(100, 100)
        .spawn(VerifySessionManager::new(core.clone()), shutdown_rx)
        .unwrap();
    core.post_jail_init(&instance);

    // Cold query over the wire.
    let (status, addr_status, text) = VerifyClient::connect(&socket_path)
        .await
        .unwrap()
        .query("user@example.org")
        .await
        .unwrap();
    assert_eq!(status, VrfyStat::Ok);
    assert_eq!(addr_status, AddrStatus::Todo);
    assert_eq!(text, IN_PROGRESS);

    // The probe is submitted after the reply is flushed.
    for _ in 0..200 {
        if !probes.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(probes.len(), 1);
    assert_eq!(probes.submitted()[0].recipient, "user@example.org");

    // Apply a probe result and read it back.
    assert_eq!(
        VerifyClient::connect(&socket_path)
            .await
            .unwrap()
            .update("user@example.org", AddrStatus::Ok, "250 ok")
            .await
            .unwrap(),
        VrfyStat::Ok
    );
    let (status, addr_status, text) = VerifyClient::connect(&socket_path)
        .await
        .unwrap()
        .query("user@example.org")
        .await
        .unwrap();
    assert_eq!(status, VrfyStat::Ok);
    assert_eq!(addr_status, AddrStatus::Ok);
    assert_eq!(text, "250 ok");

    // A status that is not a valid probe result is rejected.
    assert_eq!(
        VerifyClient::connect(&socket_path)
            .await
            .unwrap()
            .update("user@example.org", AddrStatus::Todo, "nope")
            .await
            .unwrap(),
        VrfyStat::Bad
    );

    // Unknown requests are answered with a bad-request status.
    let mut stream = BufStream::new(UnixStream::connect(&socket_path).await.unwrap());
    write_frame(&mut stream, &[("request", "bogus")]).await.unwrap();
    let reply = read_frame(&mut stream).await.unwrap().unwrap();
    assert_eq!(reply.get_num(ATTR_STATUS), Some(VrfyStat::Bad.code()));

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn persistent_map_survives_restart() {
    let dir = test_dir("verify_persistent");
    let config = Config::parse(&format!(
        "address_verify_map = \"sql:{}\"\n",
        dir.join("verify.db").display()
    ))
    .unwrap();

    let core = VerifyCore::init(&config, ProbeQueue::memory())
        .await
        .unwrap();
    assert_eq!(
        core.update(
            "user@example.org",
            AddrStatus::Ok.code(),
            "250 ok",
            utils::now()
        )
        .await,
        VrfyStat::Ok
    );
    drop(core);

    // A fresh process sees the stored result and serves it without probing.
    let probes = MemoryQueue::default();
    let mut core = VerifyCore::init(&config, ProbeQueue::memory())
        .await
        .unwrap();
    core.queue = ProbeQueue::Memory(probes.clone());
    let reply = core.query("user@example.org", utils::now()).await;
    assert_eq!(reply.status, AddrStatus::Ok);
    assert_eq!(reply.text, "250 ok");
    assert!(reply.refresh.is_none());
    assert!(probes.is_empty());
}
