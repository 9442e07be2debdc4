// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::types::{RpCandidate, RpScope};

/// Configured RP candidates keyed by configuration order.
///
/// Orders start at 1 and are never handed out twice, even after the
/// candidate holding one is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateTable {
    candidates: BTreeMap<u64, RpCandidate>,
    last_order: u64,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate serving `scope` at `rp` and return its order. A
    /// candidate with the same RP and scope keeps its order and only has its
    /// priority updated.
    pub fn add(&mut self, rp: IpAddr, scope: RpScope, priority: u8) -> u64 {
        if let Some(existing) = self
            .candidates
            .values_mut()
            .find(|c| c.rp == rp && c.scope == scope)
        {
            existing.priority = priority;
            return existing.order;
        }
        self.last_order += 1;
        let order = self.last_order;
        self.candidates.insert(
            order,
            RpCandidate {
                rp,
                scope,
                priority,
                order,
            },
        );
        order
    }

    /// Remove every candidate for `rp`, returning what was removed.
    pub fn remove(&mut self, rp: IpAddr) -> Vec<RpCandidate> {
        let orders: Vec<u64> = self
            .candidates
            .values()
            .filter(|c| c.rp == rp)
            .map(|c| c.order)
            .collect();
        orders
            .into_iter()
            .filter_map(|order| self.candidates.remove(&order))
            .collect()
    }

    /// Remove the single candidate for `rp` serving `scope`.
    pub fn remove_scoped(
        &mut self,
        rp: IpAddr,
        scope: &RpScope,
    ) -> Option<RpCandidate> {
        let order = self
            .candidates
            .values()
            .find(|c| c.rp == rp && &c.scope == scope)?
            .order;
        self.candidates.remove(&order)
    }

    /// Candidates in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &RpCandidate> {
        self.candidates.values()
    }

    pub fn list(&self) -> Vec<RpCandidate> {
        self.iter().cloned().collect()
    }

    /// Does any candidate take its scope from prefix list `name`.
    pub fn references(&self, name: &str) -> bool {
        self.iter().any(
            |c| matches!(&c.scope, RpScope::PrefixList(list) if list == name),
        )
    }

    pub fn last_order(&self) -> u64 {
        self.last_order
    }

    /// Rebuild a table from persisted candidates. The order counter resumes
    /// after the larger of `last_order` and the highest restored order.
    pub fn restore(
        candidates: impl IntoIterator<Item = RpCandidate>,
        last_order: u64,
    ) -> Self {
        let candidates: BTreeMap<u64, RpCandidate> =
            candidates.into_iter().map(|c| (c.order, c)).collect();
        let highest = candidates.keys().next_back().copied().unwrap_or(0);
        Self {
            candidates,
            last_order: last_order.max(highest),
        }
    }

    /// Renumber candidates so that every order is above `floor`, keeping
    /// their relative order. Used when a whole table replaces one that has
    /// already handed out orders up to `floor`.
    pub fn rebase(&mut self, floor: u64) {
        let first = self.candidates.keys().next().copied();
        if first.map_or(true, |first| first > floor) {
            self.last_order = self.last_order.max(floor);
            return;
        }
        let candidates = std::mem::take(&mut self.candidates);
        self.last_order = floor;
        for mut c in candidates.into_values() {
            self.last_order += 1;
            c.order = self.last_order;
            self.candidates.insert(c.order, c);
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
