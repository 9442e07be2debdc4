// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::IpAddr;

use itertools::Itertools;
use slog::Logger;

use crate::config::RpConfig;
use crate::error::Error;
use crate::log::rpmap_log;
use crate::types::{ResolvedMapping, RpCandidate, RpScope};
use crate::MOD_RESOLVER;

/// Chooses the RP for a group from one configuration snapshot.
///
/// Every candidate whose scope permits the group is a contender. The winner
/// is found by filtering the contenders in the following order.
///
/// - keep the contenders with the longest matched prefix length
/// - keep the contenders with the lowest priority value
/// - keep the contender configured first (lowest order)
/// - keep the contender with the highest RP address
///
/// Configuration orders are unique, so the last step only matters for
/// hand-built snapshots, but it keeps the selection total.
pub struct Resolver<'a> {
    config: &'a RpConfig,
    log: &'a Logger,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a RpConfig, log: &'a Logger) -> Self {
        Self { config, log }
    }

    /// Length of the prefix through which `candidate` serves `group`, if it
    /// does.
    fn evaluate(&self, candidate: &RpCandidate, group: IpAddr) -> Option<u8> {
        match &candidate.scope {
            RpScope::Range(range) => {
                range.contains(group).then_some(range.length())
            }
            RpScope::PrefixList(name) => {
                match self.config.prefix_lists.match_group(name, group) {
                    Ok(length) => length,
                    Err(e) => {
                        // Validation keeps this from happening for committed
                        // snapshots.
                        rpmap_log!(self, warn, MOD_RESOLVER,
                            "skipping candidate {}: {}", candidate, e;
                            "group" => group.to_string()
                        );
                        None
                    }
                }
            }
        }
    }

    pub fn resolve(&self, group: IpAddr) -> Result<ResolvedMapping, Error> {
        let contenders: Vec<(&RpCandidate, u8)> = self
            .config
            .candidates
            .iter()
            .filter_map(|c| self.evaluate(c, group).map(|len| (c, len)))
            .collect();

        let contenders =
            contenders.into_iter().max_set_by_key(|(_, len)| *len);

        let contenders =
            contenders.into_iter().min_set_by_key(|(c, _)| c.priority);

        let contenders =
            contenders.into_iter().min_set_by_key(|(c, _)| c.order);

        let Some((winner, prefix_length)) =
            contenders.into_iter().max_by_key(|(c, _)| c.rp)
        else {
            rpmap_log!(self, debug, MOD_RESOLVER,
                "no rp for group {}", group);
            return Err(Error::NoRpFound(group));
        };

        Ok(ResolvedMapping {
            group,
            rp: winner.rp,
            prefix_length,
            order: winner.order,
            generation: self.config.generation(),
        })
    }
}
