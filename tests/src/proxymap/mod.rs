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

use ahash::AHashMap;
use mail_proto::{
    attr::{read_frame, write_frame},
    client::ProxyClient,
    ProxyStat, ATTR_STATUS,
};
use parking_lot::Mutex;
use proxymap::{access::parse_allow_list, session::ProxySessionManager, ProxyCore};
use store::{FLAG_FIXED, FLAG_FOLD_FIX};
use tokio::{io::BufStream, net::UnixStream, sync::watch};
use utils::{
    config::Config,
    listener::{SessionManager, UnixServer},
};

use crate::test_dir;

#[tokio::test]
async fn deny_unapproved_tables() {
    let core = ProxyCore {
        allowed: parse_allow_list("proxy:hash:/etc/a"),
        handles: Mutex::new(AHashMap::new()),
    };

    // Not on the approved list, regardless of prefix depth; no handle is
    // opened on the way out.
    assert_eq!(
        core.find_table("proxy:proxy:cdb:/etc/b", 0).await.unwrap_err(),
        ProxyStat::Deny
    );
    assert_eq!(
        core.find_table("cdb:/etc/b", 0).await.unwrap_err(),
        ProxyStat::Deny
    );
    assert_eq!(
        core.find_table("proxy:not-a-table", 0).await.unwrap_err(),
        ProxyStat::Bad
    );
    assert!(core.handles.lock().is_empty());
}

#[tokio::test]
async fn proxy_service_over_socket() {
    let dir = test_dir("proxymap_socket");
    let socket_path = dir.join("proxymap.sock");
    let table_path = dir.join("relay_domains");
    std::fs::write(&table_path, "# relay domains\nExample.org OK\nk v\n").unwrap();
    let table_ref = format!("hash:{}", table_path.display());

    let config = Config::parse(&format!(
        "proxy_read_maps = \"proxy:{table_ref} proxy:hash:/etc/other\"\n"
    ))
    .unwrap();
    let core = Arc::new(ProxyCore::post_jail_init(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    UnixServer::new("proxymap", &socket_path)
        .with_limits(100, 100)
        .spawn(ProxySessionManager::new(core.clone()), shutdown_rx)
        .unwrap();

    let mut client = ProxyClient::connect(&socket_path).await.unwrap();

    // Open reports the table capabilities.
    let (status, flags) = client.open(&table_ref, 0).await.unwrap();
    assert_eq!(status, ProxyStat::Ok);
    assert_ne!(flags & FLAG_FIXED, 0);
    assert_eq!(core.handles.lock().len(), 1);

    // Lookups share the open handle across requests and connections.
    assert_eq!(
        client.lookup(&table_ref, 0, "k").await.unwrap(),
        (ProxyStat::Ok, "v".to_string())
    );
    assert_eq!(
        client.lookup(&table_ref, 0, "missing").await.unwrap(),
        (ProxyStat::NoKey, String::new())
    );
    let mut second = ProxyClient::connect(&socket_path).await.unwrap();
    assert_eq!(
        second
            .lookup(&format!("proxy:{table_ref}"), 0, "k")
            .await
            .unwrap(),
        (ProxyStat::Ok, "v".to_string())
    );
    assert_eq!(core.handles.lock().len(), 1);

    // A different flag combination opens a second handle.
    assert_eq!(
        client
            .lookup(&table_ref, FLAG_FOLD_FIX, "example.ORG")
            .await
            .unwrap(),
        (ProxyStat::Ok, "OK".to_string())
    );
    assert_eq!(core.handles.lock().len(), 2);

    // Unapproved and malformed tables are refused without opening anything.
    assert_eq!(
        client.lookup("proxy:cdb:/etc/b", 0, "k").await.unwrap(),
        (ProxyStat::Deny, String::new())
    );
    assert_eq!(
        client.lookup("no-inner-colon", 0, "k").await.unwrap(),
        (ProxyStat::Bad, String::new())
    );
    assert_eq!(core.handles.lock().len(), 2);

    // Unknown requests are answered with a bad-request status and the
    // connection keeps serving.
    let mut raw = BufStream::new(UnixStream::connect(&socket_path).await.unwrap());
    write_frame(&mut raw, &[("request", "bogus")]).await.unwrap();
    let reply = read_frame(&mut raw).await.unwrap().unwrap();
    assert_eq!(reply.get_num(ATTR_STATUS), Some(ProxyStat::Bad.code()));
    write_frame(
        &mut raw,
        &[
            ("request", "lookup"),
            ("table", table_ref.as_str()),
            ("flags", "0"),
            ("key", "k"),
        ],
    )
    .await
    .unwrap();
    let reply = read_frame(&mut raw).await.unwrap().unwrap();
    assert_eq!(reply.get_num(ATTR_STATUS), Some(ProxyStat::Ok.code()));

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn restart_when_tables_change() {
    let dir = test_dir("proxymap_change");
    let table_path = dir.join("transport");
    std::fs::write(&table_path, "example.org smtp\n").unwrap();
    let table_ref = format!("hash:{}", table_path.display());

    let config =
        Config::parse(&format!("proxy_read_maps = \"proxy:{table_ref}\"\n")).unwrap();
    let core = Arc::new(ProxyCore::post_jail_init(&config));
    let manager = ProxySessionManager::new(core.clone());

    // Nothing open yet, nothing to restart for.
    assert!(manager.pre_accept());

    core.find_table(&table_ref, 0).await.unwrap();
    assert!(manager.pre_accept());

    // Rebuilding the table on disk is noticed before the next accept.
    std::fs::remove_file(&table_path).unwrap();
    assert!(!manager.pre_accept());
}
