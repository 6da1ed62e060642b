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

use std::{path::PathBuf, time::Duration};

pub trait AsKey: Clone {
    fn as_key(&self) -> String;
}

impl AsKey for &str {
    fn as_key(&self) -> String {
        self.to_string()
    }
}

impl AsKey for String {
    fn as_key(&self) -> String {
        self.clone()
    }
}

impl AsKey for (&str, &str) {
    fn as_key(&self) -> String {
        format!("{}.{}", self.0, self.1)
    }
}

impl AsKey for (&str, &str, &str) {
    fn as_key(&self) -> String {
        format!("{}.{}.{}", self.0, self.1, self.2)
    }
}

pub trait ParseValue: Sized {
    fn parse_value(key: impl AsKey, value: &str) -> super::Result<Self>;
}

impl ParseValue for String {
    fn parse_value(_key: impl AsKey, value: &str) -> super::Result<Self> {
        Ok(value.to_string())
    }
}

impl ParseValue for PathBuf {
    fn parse_value(_key: impl AsKey, value: &str) -> super::Result<Self> {
        Ok(PathBuf::from(value))
    }
}

impl ParseValue for bool {
    fn parse_value(key: impl AsKey, value: &str) -> super::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!(
                "Invalid boolean value {:?} for property {:?}.",
                value,
                key.as_key()
            )),
        }
    }
}

impl ParseValue for Duration {
    /// Time interval with an optional `d`/`h`/`m`/`s`/`ms` suffix; a bare
    /// number is taken as seconds.
    fn parse_value(key: impl AsKey, value: &str) -> super::Result<Self> {
        let duration = value.trim().to_ascii_lowercase();
        let (num, multiplier) = if let Some(num) = duration.strip_suffix("ms") {
            (num, 1)
        } else if let Some(num) = duration.strip_suffix('d') {
            (num, 24 * 60 * 60 * 1000)
        } else if let Some(num) = duration.strip_suffix('h') {
            (num, 60 * 60 * 1000)
        } else if let Some(num) = duration.strip_suffix('m') {
            (num, 60 * 1000)
        } else if let Some(num) = duration.strip_suffix('s') {
            (num, 1000)
        } else {
            (duration.as_str(), 1000)
        };
        num.trim()
            .parse::<u64>()
            .ok()
            .map(|num| Duration::from_millis(num * multiplier))
            .ok_or_else(|| {
                format!(
                    "Invalid duration value {:?} for property {:?}.",
                    value,
                    key.as_key()
                )
            })
    }
}

macro_rules! impl_parse_number {
    ($($t:ty)*) => ($(
        impl ParseValue for $t {
            fn parse_value(key: impl AsKey, value: &str) -> super::Result<Self> {
                value.trim().parse().map_err(|_| {
                    format!(
                        "Invalid numeric value {:?} for property {:?}.",
                        value,
                        key.as_key()
                    )
                })
            }
        }
    )*)
}

impl_parse_number! { u16 u32 u64 i64 usize }
