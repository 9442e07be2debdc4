// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod db;
pub mod map;
pub mod types;

pub use config::{parse_config, RpConfig, Statement};
pub use db::Db;
pub use map::RpMap;
pub use types::*;
pub mod cache;
pub mod candidate;
pub mod error;
pub mod log;
pub mod prefix_list;
pub mod resolver;

#[cfg(test)]
mod proptest;

/// The priority RP candidates default to. Lower values are preferred.
pub const DEFAULT_RP_PRIORITY: u8 = 0;

/// Number of group mappings held before the cache is cleared.
pub const DEFAULT_CACHE_CAPACITY: usize = 0x10000;

pub const COMPONENT_RPMAP: &str = "rpmap";
pub const MOD_DB: &str = "database";
pub const MOD_MAP: &str = "map";
pub const MOD_RESOLVER: &str = "resolver";

/// Fixtures and scratch databases for tests
pub mod test;
