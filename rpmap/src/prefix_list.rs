// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named prefix lists.
//!
//! A prefix list is an ordered set of permit/deny rules keyed by sequence
//! number. Evaluating a group address against a list walks the entries in
//! ascending sequence order and the first entry containing the address
//! decides the outcome. A deny terminates evaluation without a match; it
//! does not fall through to later permits.
//!
//! A store never holds an empty list. Removing the last entry of a list
//! removes the list, so every list has a statement form.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{AddressFamily, PrefixListAction, PrefixListEntry};

/// Step between automatically assigned sequence numbers.
pub const SEQ_STEP: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
pub struct PrefixList {
    pub name: String,
    pub family: AddressFamily,
    pub entries: BTreeMap<u32, PrefixListEntry>,
}

impl PrefixList {
    pub fn new(name: &str, family: AddressFamily) -> Self {
        Self {
            name: name.to_owned(),
            family,
            entries: BTreeMap::new(),
        }
    }

    /// The sequence number given to an entry configured without one: the
    /// next multiple of [`SEQ_STEP`] above the current highest entry.
    pub fn next_seq(&self) -> Result<u32, Error> {
        let Some(top) = self.entries.keys().next_back() else {
            return Ok(SEQ_STEP);
        };
        (top / SEQ_STEP + 1).checked_mul(SEQ_STEP).ok_or_else(|| {
            Error::Conflict(format!(
                "prefix-list {} has no sequence number above {top}",
                self.name
            ))
        })
    }

    /// Add an entry, replacing and returning any entry with the same
    /// sequence number.
    pub fn insert(
        &mut self,
        entry: PrefixListEntry,
    ) -> Result<Option<PrefixListEntry>, Error> {
        if let Some(family) = entry.prefix.family() {
            if family != self.family {
                return Err(Error::Conflict(format!(
                    "{} prefix-list {} cannot hold {}",
                    self.family.keyword(),
                    self.name,
                    entry.prefix,
                )));
            }
        }
        Ok(self.entries.insert(entry.seq, entry))
    }

    /// First-match-wins evaluation. Returns the matched prefix length when
    /// the deciding entry permits the group.
    pub fn evaluate(&self, group: IpAddr) -> Option<u8> {
        if AddressFamily::of(group) != self.family {
            return None;
        }
        for entry in self.entries.values() {
            if let Some(length) = entry.prefix.length_matching(group) {
                return match entry.action {
                    PrefixListAction::Permit => Some(length),
                    PrefixListAction::Deny => None,
                };
            }
        }
        None
    }
}

/// The set of prefix lists known to a configuration.
///
/// Cloning a store shares its evaluation counter, so the counter observes
/// evaluations across every snapshot derived from the same origin.
#[derive(Debug, Clone, Default)]
pub struct PrefixListStore {
    lists: BTreeMap<String, PrefixList>,
    match_calls: Arc<AtomicU64>,
}

impl PartialEq for PrefixListStore {
    fn eq(&self, other: &Self) -> bool {
        self.lists == other.lists
    }
}

impl PrefixListStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does list `name` permit `group`, and with what prefix length.
    pub fn match_group(
        &self,
        name: &str,
        group: IpAddr,
    ) -> Result<Option<u8>, Error> {
        self.match_calls.fetch_add(1, Ordering::Relaxed);
        let list = self
            .lists
            .get(name)
            .ok_or_else(|| Error::UnknownList(name.to_owned()))?;
        Ok(list.evaluate(group))
    }

    /// Number of list evaluations performed so far.
    pub fn match_calls(&self) -> u64 {
        self.match_calls.load(Ordering::Relaxed)
    }

    /// Add an entry to list `name`, creating the list if needed.
    pub fn add_entry(
        &mut self,
        family: AddressFamily,
        name: &str,
        entry: PrefixListEntry,
    ) -> Result<Option<PrefixListEntry>, Error> {
        let Some(list) = self.lists.get_mut(name) else {
            let mut list = PrefixList::new(name, family);
            list.insert(entry)?;
            self.lists.insert(name.to_owned(), list);
            return Ok(None);
        };
        if list.family != family {
            return Err(Error::Conflict(format!(
                "prefix-list {name} is an {} list",
                list.family.keyword()
            )));
        }
        list.insert(entry)
    }

    /// Sequence number an entry added to `name` without one would get.
    pub fn next_seq(&self, name: &str) -> Result<u32, Error> {
        match self.lists.get(name) {
            Some(list) => list.next_seq(),
            None => Ok(SEQ_STEP),
        }
    }

    /// Replace list `name` wholesale with `entries`. Replacing with no
    /// entries removes the list.
    pub fn replace(
        &mut self,
        name: &str,
        family: AddressFamily,
        entries: impl IntoIterator<Item = PrefixListEntry>,
    ) -> Result<(), Error> {
        let mut list = PrefixList::new(name, family);
        for entry in entries {
            if list.insert(entry)?.is_some() {
                return Err(Error::Conflict(format!(
                    "duplicate seq {} in prefix-list {name}",
                    entry.seq
                )));
            }
        }
        if list.entries.is_empty() {
            self.lists.remove(name);
        } else {
            self.lists.insert(name.to_owned(), list);
        }
        Ok(())
    }

    pub fn insert_list(&mut self, list: PrefixList) {
        if !list.entries.is_empty() {
            self.lists.insert(list.name.clone(), list);
        }
    }

    pub fn remove_entry(
        &mut self,
        name: &str,
        seq: u32,
    ) -> Result<PrefixListEntry, Error> {
        let list = self
            .lists
            .get_mut(name)
            .ok_or_else(|| Error::UnknownList(name.to_owned()))?;
        let entry = list.entries.remove(&seq).ok_or_else(|| {
            Error::NotFound(format!("prefix-list {name} seq {seq}"))
        })?;
        if list.entries.is_empty() {
            self.lists.remove(name);
        }
        Ok(entry)
    }

    /// Remove a whole list. Callers are responsible for checking that no
    /// candidate still references it.
    pub fn remove(&mut self, name: &str) -> Result<PrefixList, Error> {
        self.lists
            .remove(name)
            .ok_or_else(|| Error::UnknownList(name.to_owned()))
    }

    pub fn get(&self, name: &str) -> Option<&PrefixList> {
        self.lists.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    /// Lists in name order.
    pub fn iter(&self) -> impl Iterator<Item = &PrefixList> {
        self.lists.values()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Prefix, PrefixListMatch};
    use rp_common::{cidr, ip};

    fn v4(name: &str, entries: &[PrefixListEntry]) -> PrefixListStore {
        let mut store = PrefixListStore::new();
        store
            .replace(name, AddressFamily::Ipv4, entries.iter().copied())
            .expect("replace");
        store
    }

    fn check(store: &PrefixListStore, group: &str) -> Option<u8> {
        store.match_group("pl", ip!(group)).expect("match group")
    }

    #[test]
    fn test_first_match_wins() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let p24: Prefix = cidr!("239.100.0.0/24");
        let store = v4(
            "pl",
            &[PrefixListEntry::permit(10, p28), PrefixListEntry::deny(20, p24)],
        );

        assert_eq!(check(&store, "239.100.0.5"), Some(28));
        assert_eq!(check(&store, "239.100.0.20"), None);
        assert_eq!(check(&store, "239.200.0.1"), None);
    }

    #[test]
    fn test_deny_does_not_fall_through() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let p24: Prefix = cidr!("239.100.0.0/24");
        let store = v4(
            "pl",
            &[PrefixListEntry::deny(5, p28), PrefixListEntry::permit(10, p24)],
        );

        assert_eq!(check(&store, "239.100.0.1"), None);
        assert_eq!(check(&store, "239.100.0.99"), Some(24));
    }

    #[test]
    fn test_seq_not_insertion_order() {
        let p25: Prefix = cidr!("239.100.0.128/25");
        let p32: Prefix = cidr!("239.100.0.200/32");
        let mut store = PrefixListStore::new();
        store
            .add_entry(
                AddressFamily::Ipv4,
                "pl",
                PrefixListEntry::permit(20, p25),
            )
            .expect("add entry");
        store
            .add_entry(
                AddressFamily::Ipv4,
                "pl",
                PrefixListEntry::deny(10, p32),
            )
            .expect("add entry");

        assert_eq!(check(&store, "239.100.0.200"), None);
        assert_eq!(check(&store, "239.100.0.201"), Some(25));
    }

    #[test]
    fn test_any_and_family() {
        let store =
            v4("pl", &[PrefixListEntry::permit(5, PrefixListMatch::Any)]);
        assert_eq!(check(&store, "232.1.1.1"), Some(0));
        assert_eq!(check(&store, "ff3e::1"), None);
    }

    #[test]
    fn test_unknown_list() {
        let store = PrefixListStore::new();
        assert!(matches!(
            store.match_group("nope", ip!("239.1.1.1")),
            Err(Error::UnknownList(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_replace_rejects_duplicate_seq() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let p32: Prefix = cidr!("239.100.0.17/32");
        let mut store = PrefixListStore::new();
        let result = store.replace(
            "pl",
            AddressFamily::Ipv4,
            [
                PrefixListEntry::permit(10, p28),
                PrefixListEntry::permit(10, p32),
            ],
        );
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(!store.contains("pl"));
    }

    #[test]
    fn test_replace_with_nothing_removes() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let mut store = v4("pl", &[PrefixListEntry::permit(10, p28)]);
        store
            .replace("pl", AddressFamily::Ipv4, Vec::new())
            .expect("replace");
        assert!(!store.contains("pl"));
    }

    #[test]
    fn test_family_conflict() {
        let p6: Prefix = cidr!("ff3e::/16");
        let mut store = PrefixListStore::new();
        let result = store.add_entry(
            AddressFamily::Ipv4,
            "pl",
            PrefixListEntry::permit(5, p6),
        );
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_next_seq() {
        let p: Prefix = cidr!("239.0.0.0/8");
        let mut store = PrefixListStore::new();
        assert_eq!(store.next_seq("pl").ok(), Some(5));
        store
            .add_entry(
                AddressFamily::Ipv4,
                "pl",
                PrefixListEntry::permit(12, p),
            )
            .expect("add entry");
        assert_eq!(store.next_seq("pl").ok(), Some(15));
    }

    #[test]
    fn test_next_seq_exhausted() {
        let p: Prefix = cidr!("239.0.0.0/8");
        let top = u32::MAX - u32::MAX % SEQ_STEP;
        let store = v4("pl", &[PrefixListEntry::permit(top, p)]);
        assert!(matches!(store.next_seq("pl"), Err(Error::Conflict(_))));

        // the last multiple below u32::MAX still has room above it
        let store = v4("pl", &[PrefixListEntry::permit(top - 1, p)]);
        assert_eq!(store.next_seq("pl").ok(), Some(top));
    }

    #[test]
    fn test_remove_entry() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let p24: Prefix = cidr!("239.100.0.0/24");
        let mut store = v4(
            "pl",
            &[PrefixListEntry::permit(10, p28), PrefixListEntry::deny(20, p24)],
        );
        assert!(store.remove_entry("pl", 30).is_err());
        store.remove_entry("pl", 10).expect("remove");
        assert_eq!(check(&store, "239.100.0.1"), None);
        assert!(store.contains("pl"));

        // losing the last entry removes the list
        store.remove_entry("pl", 20).expect("remove");
        assert!(!store.contains("pl"));
    }

    #[test]
    fn test_match_counter_shared_by_clones() {
        let p28: Prefix = cidr!("239.100.0.0/28");
        let store = v4("pl", &[PrefixListEntry::permit(10, p28)]);
        let copy = store.clone();
        check(&store, "239.100.0.1");
        check(&copy, "239.100.0.1");
        assert_eq!(store.match_calls(), 2);
    }
}
