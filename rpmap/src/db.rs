// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent storage for RP mapping configuration.
//!
//! Configuration is kept in a sled key-value store so that candidate
//! configuration order, and therefore tie-break order, survives restarts.
use crate::candidate::CandidateTable;
use crate::config::RpConfig;
use crate::error::Error;
use crate::log::rpmap_log;
use crate::prefix_list::{PrefixList, PrefixListStore};
use crate::types::RpCandidate;
use crate::MOD_DB;
use slog::Logger;
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;

/// The handle used to open a persistent key-value tree for prefix lists.
const PREFIX_LIST: &str = "prefix_list";

/// The handle used to open a persistent key-value tree for RP candidates.
const RP_CANDIDATE: &str = "rp_candidate";

/// The handle used to open a persistent key-value tree for settings.
const SETTINGS: &str = "settings";

/// Key in the settings tree for the last handed out configuration order.
const LAST_ORDER_KEY: &str = "last_order";

#[derive(Clone)]
pub struct Db {
    persistent: sled::Db,
    log: Logger,
}

impl Db {
    /// Open (or create) a database at `path`.
    pub fn new(path: &str, log: Logger) -> Result<Self, Error> {
        Ok(Self {
            persistent: sled::open(path)?,
            log,
        })
    }

    /// Overwrite the stored configuration with `config`. All three trees
    /// are rewritten in one transaction, so the database holds either the
    /// previous configuration or this one.
    pub fn store_config(&self, config: &RpConfig) -> Result<(), Error> {
        let lists = self.persistent.open_tree(PREFIX_LIST)?;
        let candidates = self.persistent.open_tree(RP_CANDIDATE)?;
        let settings = self.persistent.open_tree(SETTINGS)?;

        let mut list_records = Vec::new();
        for list in config.prefix_lists.iter() {
            let value = serde_json::to_string(list)?;
            list_records.push((list.name.clone().into_bytes(), value));
        }
        let mut candidate_records = Vec::new();
        for c in config.candidates.iter() {
            let value = serde_json::to_string(c)?;
            candidate_records.push((c.order.to_be_bytes(), value));
        }
        let last_order = config.candidates.last_order().to_be_bytes();

        // Writers are serialized by the engine, so keys read here are still
        // current when the transaction runs.
        let stale_lists = lists.iter().keys().collect::<Result<Vec<_>, _>>()?;
        let stale_candidates =
            candidates.iter().keys().collect::<Result<Vec<_>, _>>()?;

        let result: TransactionResult<()> = (&lists, &candidates, &settings)
            .transaction(|(lists, candidates, settings)| {
                for key in &stale_lists {
                    lists.remove(key.clone())?;
                }
                for (key, value) in &list_records {
                    lists.insert(key.as_slice(), value.as_str())?;
                }
                for key in &stale_candidates {
                    candidates.remove(key.clone())?;
                }
                for (key, value) in &candidate_records {
                    candidates.insert(&key[..], value.as_str())?;
                }
                settings.insert(LAST_ORDER_KEY, &last_order[..])?;
                Ok(())
            });
        result.map_err(|e| match e {
            TransactionError::Storage(e) => Error::DataStore(e),
            TransactionError::Abort(()) => {
                Error::DbKey("configuration store aborted".into())
            }
        })?;

        self.persistent.flush()?;
        Ok(())
    }

    pub fn get_prefix_lists(&self) -> Result<Vec<PrefixList>, Error> {
        let tree = self.persistent.open_tree(PREFIX_LIST)?;
        let result = tree
            .scan_prefix(vec![])
            .filter_map(|item| {
                let (_key, value) = match item {
                    Ok(item) => item,
                    Err(e) => {
                        rpmap_log!(self, error, MOD_DB,
                            "error fetching prefix list entry: {}", e);
                        return None;
                    }
                };
                let value = String::from_utf8_lossy(&value);
                match serde_json::from_str(&value) {
                    Ok(list) => Some(list),
                    Err(e) => {
                        rpmap_log!(self, error, MOD_DB,
                            "error parsing prefix list entry value: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(result)
    }

    pub fn get_candidates(&self) -> Result<Vec<RpCandidate>, Error> {
        let tree = self.persistent.open_tree(RP_CANDIDATE)?;
        let result = tree
            .scan_prefix(vec![])
            .filter_map(|item| {
                let (_key, value) = match item {
                    Ok(item) => item,
                    Err(e) => {
                        rpmap_log!(self, error, MOD_DB,
                            "error fetching rp candidate entry: {}", e);
                        return None;
                    }
                };
                let value = String::from_utf8_lossy(&value);
                match serde_json::from_str(&value) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        rpmap_log!(self, error, MOD_DB,
                            "error parsing rp candidate entry value: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(result)
    }

    pub fn get_last_order(&self) -> Result<u64, Error> {
        let tree = self.persistent.open_tree(SETTINGS)?;
        let Some(value) = tree.get(LAST_ORDER_KEY)? else {
            return Ok(0);
        };
        let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| {
            Error::DbKey(format!(
                "{LAST_ORDER_KEY} has {} bytes, expected 8",
                value.len()
            ))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// Rebuild the stored configuration.
    pub fn load_config(&self) -> Result<RpConfig, Error> {
        let mut prefix_lists = PrefixListStore::new();
        for list in self.get_prefix_lists()? {
            prefix_lists.insert_list(list);
        }
        let candidates = CandidateTable::restore(
            self.get_candidates()?,
            self.get_last_order()?,
        );
        let config = RpConfig {
            generation: 0,
            prefix_lists,
            candidates,
        };
        config.validate()?;
        rpmap_log!(self, info, MOD_DB,
            "loaded {} prefix lists and {} rp candidates",
            config.prefix_lists.len(),
            config.candidates.len()
        );
        Ok(config)
    }
}
