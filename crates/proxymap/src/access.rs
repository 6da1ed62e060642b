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

use ahash::AHashSet;
use mail_proto::ProxyStat;

use crate::ProxyCore;

pub const PROXY_PREFIX: &str = "proxy:";

/// Build the approved table set from a whitespace-separated configuration
/// value. Only tokens carrying a `proxy:` prefix are proxy candidates; the
/// prefix is stripped, repeatedly for tables proxied through more than one
/// hop, and what remains must still name a `type:name` table.
pub fn parse_allow_list(value: &str) -> AHashSet<String> {
    let mut allowed = AHashSet::new();
    for token in value.split_ascii_whitespace() {
        let Some(name) = token.strip_prefix(PROXY_PREFIX) else {
            continue;
        };
        let name = strip_proxy_prefixes(name);
        if name.contains(':') {
            allowed.insert(name.to_string());
        }
    }
    allowed
}

/// Remove any number of leading `proxy:` prefixes.
pub fn strip_proxy_prefixes(mut name: &str) -> &str {
    while let Some(stripped) = name.strip_prefix(PROXY_PREFIX) {
        name = stripped;
    }
    name
}

impl ProxyCore {
    /// Canonicalize a requested table name and check it against the
    /// approved set.
    pub fn check_access<'x>(&self, table: &'x str) -> Result<&'x str, ProxyStat> {
        let name = strip_proxy_prefixes(table);
        if !name.contains(':') {
            return Err(ProxyStat::Bad);
        }
        if !self.allowed.contains(name) {
            tracing::warn!(
                context = "proxymap",
                event = "deny",
                table = name,
                "Request for unapproved table; to approve it, list proxy:{} in proxy_read_maps.",
                name
            );
            return Err(ProxyStat::Deny);
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use ahash::AHashSet;
    use mail_proto::ProxyStat;
    use parking_lot::Mutex;

    use super::parse_allow_list;
    use crate::ProxyCore;

    #[test]
    fn allow_list_tokens() {
        let allowed = parse_allow_list(
            "proxy:hash:/etc/aliases \t proxy:proxy:sql:/var/db/users.db\nhash:/etc/not-proxied proxy:bare-name proxy:hash:/etc/aliases",
        );
        assert_eq!(
            allowed,
            AHashSet::from_iter([
                "hash:/etc/aliases".to_string(),
                "sql:/var/db/users.db".to_string(),
            ])
        );
        assert!(parse_allow_list("").is_empty());
    }

    #[test]
    fn access_closed_under_prefix_stripping() {
        let core = ProxyCore {
            allowed: parse_allow_list("proxy:hash:/etc/a"),
            handles: Mutex::new(Default::default()),
        };

        // Any number of leading prefixes resolves to the same table.
        for table in [
            "hash:/etc/a",
            "proxy:hash:/etc/a",
            "proxy:proxy:hash:/etc/a",
            "proxy:proxy:proxy:hash:/etc/a",
        ] {
            assert_eq!(core.check_access(table), Ok("hash:/etc/a"));
        }
        for table in [
            "cdb:/etc/b",
            "proxy:proxy:cdb:/etc/b",
            "hash:/etc/aa",
        ] {
            assert_eq!(core.check_access(table), Err(ProxyStat::Deny));
        }
        for table in ["proxy:hash", "hash", "proxy:proxy:"] {
            assert_eq!(core.check_access(table), Err(ProxyStat::Bad));
        }
    }
}
