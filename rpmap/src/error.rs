// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::IpAddr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("datastore error {0}")]
    DataStore(#[from] sled::Error),

    #[error("serialization error {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("db key error {0}")]
    DbKey(String),

    /// A candidate or lookup names a prefix list that was never defined.
    #[error("unknown prefix list {0}")]
    UnknownList(String),

    /// No candidate's group scope permits the group. This is an ordinary
    /// per-group outcome, not a fault.
    #[error("no rp found for group {0}")]
    NoRpFound(IpAddr),

    #[error("malformed prefix {0}")]
    MalformedPrefix(String),

    #[error("malformed statement: {0}")]
    MalformedStatement(String),

    #[error("line {line}: {source}")]
    Statement {
        line: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("rejected '{statement}': {source}")]
    Rejected {
        statement: String,
        #[source]
        source: Box<Error>,
    },

    #[error("in use {0}")]
    InUse(String),

    #[error("conflict {0}")]
    Conflict(String),

    #[error("not found {0}")]
    NotFound(String),
}
