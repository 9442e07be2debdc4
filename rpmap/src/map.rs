// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The RP mapping engine.
//!
//! [`RpMap`] owns the current configuration as an immutable [`RpConfig`]
//! snapshot behind a single reader-writer lock, together with the mapping
//! cache for that snapshot.
//!
//! ## Readers
//!
//! `resolve` holds the read lock for the whole lookup: cache probe, live
//! evaluation on a miss and cache insert. Readers run concurrently.
//!
//! ## Writers
//!
//! Every configuration change clones the current snapshot, edits and
//! validates the clone, persists it when a database is attached, swaps it
//! in and invalidates the cache, all while holding the write lock. A failed
//! edit leaves the current snapshot and cache untouched. Watchers are
//! notified after the lock is released.

use std::net::IpAddr;
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};

use slog::{error, Logger};

use rp_common::{read_lock, write_lock};

use crate::cache::MappingCache;
use crate::config::{RpConfig, Statement};
use crate::db::Db;
use crate::error::Error;
use crate::log::rpmap_log;
use crate::prefix_list::PrefixList;
use crate::resolver::Resolver;
use crate::types::{
    AddressFamily, CacheStats, PrefixListEntry, ResolvedMapping, RpCandidate,
    RpChangeNotification, RpScope,
};
use crate::{DEFAULT_CACHE_CAPACITY, DEFAULT_RP_PRIORITY, MOD_MAP};

#[derive(Clone)]
pub struct RpMap {
    /// The committed configuration snapshot.
    config: Arc<RwLock<Arc<RpConfig>>>,

    /// Resolutions against the committed snapshot.
    cache: Arc<MappingCache>,

    /// Watchers notified of committed configuration changes.
    watchers: Arc<RwLock<Vec<Watcher>>>,

    /// Where committed snapshots are persisted, if anywhere.
    persistent: Option<Db>,

    log: Logger,
}

#[derive(Clone)]
struct Watcher {
    tag: String,
    sender: Sender<RpChangeNotification>,
}

impl RpMap {
    /// Create an empty, memory-only engine.
    pub fn new(log: Logger) -> Self {
        Self::with_cache_capacity(log, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(log: Logger, capacity: usize) -> Self {
        Self::from_parts(RpConfig::new(), None, capacity, log)
    }

    /// Open an engine backed by the database at `path`, restoring whatever
    /// configuration it holds.
    pub fn open(path: &str, log: Logger) -> Result<Self, Error> {
        let db = Db::new(path, log.clone())?;
        let config = db.load_config()?;
        Ok(Self::from_parts(
            config,
            Some(db),
            DEFAULT_CACHE_CAPACITY,
            log,
        ))
    }

    fn from_parts(
        config: RpConfig,
        persistent: Option<Db>,
        capacity: usize,
        log: Logger,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(Arc::new(config))),
            cache: Arc::new(MappingCache::new(capacity)),
            watchers: Arc::new(RwLock::new(Vec::new())),
            persistent,
            log,
        }
    }

    /// Register a watcher for configuration changes.
    pub fn watch(&self, tag: String, sender: Sender<RpChangeNotification>) {
        write_lock!(self.watchers).push(Watcher { tag, sender });
    }

    /// Remove a watcher by tag.
    pub fn unwatch(&self, tag: &str) {
        write_lock!(self.watchers).retain(|w| w.tag != tag);
    }

    /// Notify all watchers, dropping those whose receiver has gone away.
    fn notify(&self, n: RpChangeNotification) {
        let snapshot: Vec<Watcher> =
            read_lock!(self.watchers).iter().cloned().collect();

        let mut dead_tags = Vec::new();
        for Watcher { tag, sender } in &snapshot {
            if let Err(e) = sender.send(n) {
                error!(self.log, "watcher '{tag}' disconnected, removing: {e}");
                dead_tags.push(tag.clone());
            }
        }

        if !dead_tags.is_empty() {
            write_lock!(self.watchers).retain(|w| !dead_tags.contains(&w.tag));
        }
    }

    /// Determine the RP serving `group`.
    pub fn resolve(&self, group: IpAddr) -> Result<ResolvedMapping, Error> {
        let config = read_lock!(self.config);
        if let Some(mapping) = self.cache.get(group) {
            return Ok(mapping);
        }
        let mapping = Resolver::new(&config, &self.log).resolve(group)?;
        self.cache.insert(mapping);
        Ok(mapping)
    }

    /// Apply `edit` to a copy of the current configuration and commit it.
    fn commit<T>(
        &self,
        what: &str,
        edit: impl FnOnce(&mut RpConfig) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let (out, generation) = {
            let mut current = write_lock!(self.config);
            let mut next = RpConfig::clone(&current);
            let out = match edit(&mut next).and_then(|out| {
                next.validate()?;
                Ok(out)
            }) {
                Ok(out) => out,
                Err(e) => {
                    rpmap_log!(self, warn, MOD_MAP,
                        "rejected {}: {}", what, e);
                    return Err(e);
                }
            };
            next.generation = current.generation + 1;
            if let Some(db) = &self.persistent {
                db.store_config(&next)?;
            }
            let generation = next.generation;
            *current = Arc::new(next);
            self.cache.invalidate_all();
            (out, generation)
        };

        rpmap_log!(self, info, MOD_MAP, "committed {}", what;
            "generation" => generation
        );
        self.notify(RpChangeNotification { generation });
        Ok(out)
    }

    /// Replace prefix list `name` with `entries`. Loading no entries removes
    /// the list, which fails with [`Error::InUse`] while any candidate
    /// references it.
    pub fn load_prefix_list(
        &self,
        name: &str,
        family: AddressFamily,
        entries: Vec<PrefixListEntry>,
    ) -> Result<(), Error> {
        self.commit(&format!("prefix-list {name}"), |c| {
            c.prefix_lists.replace(name, family, entries)?;
            not_emptied_in_use(c, name)
        })
    }

    /// Add or replace a single entry of list `name`, creating the list if
    /// needed.
    pub fn add_prefix_list_entry(
        &self,
        name: &str,
        family: AddressFamily,
        entry: PrefixListEntry,
    ) -> Result<(), Error> {
        self.commit(&format!("prefix-list {name} {entry}"), |c| {
            c.prefix_lists.add_entry(family, name, entry).map(|_| ())
        })
    }

    /// Remove entry `seq` of list `name`. Removing the last entry removes
    /// the list, which fails with [`Error::InUse`] while any candidate
    /// references it.
    pub fn remove_prefix_list_entry(
        &self,
        name: &str,
        seq: u32,
    ) -> Result<PrefixListEntry, Error> {
        self.commit(&format!("no prefix-list {name} seq {seq}"), |c| {
            let entry = c.prefix_lists.remove_entry(name, seq)?;
            not_emptied_in_use(c, name)?;
            Ok(entry)
        })
    }

    /// Remove prefix list `name`. Fails with [`Error::InUse`] while any
    /// candidate references it.
    pub fn remove_prefix_list(&self, name: &str) -> Result<PrefixList, Error> {
        self.commit(&format!("no prefix-list {name}"), |c| {
            if c.candidates.references(name) {
                return Err(Error::InUse(format!(
                    "prefix-list {name} is referenced by an rp candidate"
                )));
            }
            c.prefix_lists.remove(name)
        })
    }

    /// Add an RP whose groups are those permitted by prefix list `list`.
    /// The list must already exist.
    pub fn load_candidate(&self, rp: IpAddr, list: &str) -> Result<u64, Error> {
        self.add_candidate(
            rp,
            RpScope::PrefixList(list.to_owned()),
            DEFAULT_RP_PRIORITY,
        )
    }

    /// Add an RP candidate and return its configuration order.
    pub fn add_candidate(
        &self,
        rp: IpAddr,
        scope: RpScope,
        priority: u8,
    ) -> Result<u64, Error> {
        self.commit(&format!("rp {rp} {scope}"), |c| {
            Ok(c.candidates.add(rp, scope, priority))
        })
    }

    /// Remove every candidate for `rp`.
    pub fn remove_candidate(
        &self,
        rp: IpAddr,
    ) -> Result<Vec<RpCandidate>, Error> {
        self.commit(&format!("no rp {rp}"), |c| {
            let removed = c.candidates.remove(rp);
            if removed.is_empty() {
                return Err(Error::NotFound(format!("rp candidate {rp}")));
            }
            Ok(removed)
        })
    }

    /// Remove the candidate for `rp` serving `scope`.
    pub fn remove_candidate_scoped(
        &self,
        rp: IpAddr,
        scope: &RpScope,
    ) -> Result<RpCandidate, Error> {
        self.commit(&format!("no rp {rp} {scope}"), |c| {
            c.candidates.remove_scoped(rp, scope).ok_or_else(|| {
                Error::NotFound(format!("rp candidate {rp} {scope}"))
            })
        })
    }

    /// Apply a batch of statements atomically. Either every statement is
    /// applied or, if any is rejected, none is.
    pub fn apply(&self, statements: &[Statement]) -> Result<(), Error> {
        self.commit(&format!("{} statements", statements.len()), |c| {
            c.apply_batch(statements)
        })
    }

    /// Replace the whole configuration. The new candidates are renumbered
    /// after every order handed out so far, keeping their relative order.
    pub fn reload(&self, config: RpConfig) -> Result<(), Error> {
        self.commit("reload", |c| {
            let generation = c.generation;
            let floor = c.candidates.last_order();
            *c = config;
            c.candidates.rebase(floor);
            c.generation = generation;
            Ok(())
        })
    }

    /// The committed configuration snapshot.
    pub fn config(&self) -> Arc<RpConfig> {
        read_lock!(self.config).clone()
    }

    pub fn generation(&self) -> u64 {
        read_lock!(self.config).generation()
    }

    /// RP candidates in configuration order.
    pub fn rp_info(&self) -> Vec<RpCandidate> {
        self.config().candidates.list()
    }

    pub fn prefix_lists(&self) -> Vec<PrefixList> {
        self.config().prefix_lists.iter().cloned().collect()
    }

    /// Mappings currently held in the cache.
    pub fn mappings(&self) -> Vec<ResolvedMapping> {
        self.cache.mappings()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of prefix-list evaluations performed against the committed
    /// configuration lineage.
    pub fn match_calls(&self) -> u64 {
        self.config().prefix_lists.match_calls()
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }
}

/// A list that lost its last entry is gone; that is only allowed when no
/// candidate takes its groups from it.
fn not_emptied_in_use(c: &RpConfig, name: &str) -> Result<(), Error> {
    if !c.prefix_lists.contains(name) && c.candidates.references(name) {
        return Err(Error::InUse(format!(
            "prefix-list {name} is referenced by an rp candidate and \
             cannot be left empty"
        )));
    }
    Ok(())
}
