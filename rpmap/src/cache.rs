// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Memoized group to RP resolutions.
//!
//! Entries are never updated in place. Any configuration change drops the
//! whole cache, and a full cache is cleared before the next insert rather
//! than evicting individual entries.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use rp_common::{read_lock, write_lock};

use crate::types::{CacheStats, ResolvedMapping};

pub struct MappingCache {
    entries: RwLock<HashMap<IpAddr, ResolvedMapping>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl MappingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn get(&self, group: IpAddr) -> Option<ResolvedMapping> {
        let found = read_lock!(self.entries).get(&group).copied();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, mapping: ResolvedMapping) {
        let mut entries = write_lock!(self.entries);
        if entries.len() >= self.capacity
            && !entries.contains_key(&mapping.group)
        {
            entries.clear();
        }
        entries.insert(mapping.group, mapping);
    }

    pub fn invalidate_all(&self) {
        write_lock!(self.entries).clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Cached mappings ordered by group address.
    pub fn mappings(&self) -> Vec<ResolvedMapping> {
        let mut result: Vec<ResolvedMapping> =
            read_lock!(self.entries).values().copied().collect();
        result.sort_by_key(|m| m.group);
        result
    }

    pub fn len(&self) -> usize {
        read_lock!(self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock!(self.entries).is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
