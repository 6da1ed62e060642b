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

pub mod utils;

use std::collections::BTreeMap;

use crate::UnwrapFailure;

use self::utils::{AsKey, ParseValue};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub keys: BTreeMap<String, String>,
}

pub type Result<T> = std::result::Result<T, String>;

impl Config {
    pub fn init() -> Self {
        let mut config_path = None;
        let mut found_param = false;

        for arg in std::env::args().skip(1) {
            if let Some((key, value)) = arg.split_once('=') {
                if key.starts_with("--config") {
                    config_path = value.trim().to_string().into();
                    break;
                } else {
                    crate::failed(&format!("Invalid command line argument: {key}"));
                }
            } else if found_param {
                config_path = arg.into();
                break;
            } else if arg.starts_with("--config") {
                found_param = true;
            } else {
                crate::failed(&format!("Invalid command line argument: {arg}"));
            }
        }

        let config_path = config_path
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .failed("Missing parameter --config=<path-to-config>.");

        Config::parse(
            &std::fs::read_to_string(&config_path)
                .failed(&format!("Could not read configuration file {config_path:?}")),
        )
        .failed(&format!("Invalid configuration file {config_path:?}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut keys = BTreeMap::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("Missing '=' on line {}: {line:?}", line_num + 1))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Missing key on line {}: {line:?}", line_num + 1));
            }
            let value = line_unquote(value.trim(), line_num)?;
            keys.insert(key.to_string(), value);
        }
        Ok(Config { keys })
    }

    pub fn value(&self, key: impl AsKey) -> Option<&str> {
        self.keys.get(&key.as_key()).map(|v| v.as_str())
    }

    pub fn value_require(&self, key: impl AsKey) -> Result<&str> {
        let key = key.as_key();
        self.keys
            .get(&key)
            .map(|v| v.as_str())
            .ok_or_else(|| format!("Missing property {key:?}."))
    }

    pub fn value_or_default<'x>(&'x self, key: impl AsKey, default: &'x str) -> &'x str {
        self.keys
            .get(&key.as_key())
            .map_or(default, |v| v.as_str())
    }

    pub fn property<T: ParseValue>(&self, key: impl AsKey) -> Result<Option<T>> {
        let key_ = key.as_key();
        if let Some(value) = self.keys.get(&key_) {
            T::parse_value(key, value).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn property_or_static<T: ParseValue>(&self, key: impl AsKey, default: &str) -> Result<T> {
        let key_ = key.as_key();
        let value = self.keys.get(&key_).map_or(default, |v| v.as_str());
        T::parse_value(key, value)
    }

    pub fn property_require<T: ParseValue>(&self, key: impl AsKey) -> Result<T> {
        match self.property(key.clone())? {
            Some(result) => Ok(result),
            None => Err(format!("Missing property {:?}.", key.as_key())),
        }
    }
}

fn line_unquote(value: &str, line_num: usize) -> Result<String> {
    if let Some(value) = value.strip_prefix('"') {
        value
            .strip_suffix('"')
            .map(|v| v.to_string())
            .ok_or_else(|| format!("Unterminated string on line {}.", line_num + 1))
    } else if let Some(value) = value.strip_prefix('\'') {
        value
            .strip_suffix('\'')
            .map(|v| v.to_string())
            .ok_or_else(|| format!("Unterminated string on line {}.", line_num + 1))
    } else {
        Ok(value.to_string())
    }
}
