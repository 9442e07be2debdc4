// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    /// The leading keyword of configuration statements for this family.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Ipv4 => "ip",
            Self::Ipv6 => "ipv6",
        }
    }

    /// The group range a static RP serves when none is configured: all of
    /// 224.0.0.0/4 or ff00::/8.
    pub fn default_group_range(&self) -> Prefix {
        match self {
            Self::Ipv4 => Prefix4::new(Ipv4Addr::new(224, 0, 0, 0), 4).into(),
            Self::Ipv6 => {
                Prefix6::new(Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8)
                    .into()
            }
        }
    }
}

impl FromStr for AddressFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            _ => Err(Error::MalformedStatement(format!(
                "unknown address family '{s}', must be ip or ipv6"
            ))),
        }
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, Hash, PartialEq, JsonSchema,
)]
pub struct Prefix4 {
    pub value: Ipv4Addr,
    pub length: u8,
}

impl PartialOrd for Prefix4 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix4 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix4 {
    pub const HOST_MASK: u8 = 32;

    /// Create a new `Prefix4`, zeroing any host bits.
    /// ```
    /// use rpmap::types::Prefix4;
    /// use std::net::Ipv4Addr;
    /// let p4 = Prefix4::new(Ipv4Addr::new(239, 100, 0, 17), 28);
    /// assert_eq!(p4.value, Ipv4Addr::new(239, 100, 0, 16));
    /// ```
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    fn mask(&self) -> u32 {
        match self.length {
            0 => 0,
            n if n >= Self::HOST_MASK => !0u32,
            n => (!0u32) << (32 - n),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & self.mask() == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value = Ipv4Addr::from_bits(self.value.to_bits() & self.mask())
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix4) -> bool {
        if self.length < other.length {
            return false;
        }
        let mask = other.mask();
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        Prefix4 {
            value: addr,
            length: Self::HOST_MASK,
        }
        .within(self)
    }
}

impl Display for Prefix4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) = s
            .split_once('/')
            .ok_or(Error::MalformedPrefix(format!("{s}: missing length")))?;
        let value: Ipv4Addr = value
            .parse()
            .map_err(|_| Error::MalformedPrefix(format!("{s}: bad address")))?;
        let length: u8 = length
            .parse()
            .map_err(|_| Error::MalformedPrefix(format!("{s}: bad length")))?;
        if length > Self::HOST_MASK {
            return Err(Error::MalformedPrefix(format!(
                "{s}: length exceeds {}",
                Self::HOST_MASK
            )));
        }
        Ok(Self::new(value, length))
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, JsonSchema,
)]
pub struct Prefix6 {
    pub value: Ipv6Addr,
    pub length: u8,
}

impl PartialOrd for Prefix6 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix6 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix6 {
    pub const HOST_MASK: u8 = 128;

    /// Create a new `Prefix6`, zeroing any host bits.
    /// ```
    /// use rpmap::types::Prefix6;
    /// use std::net::Ipv6Addr;
    /// use std::str::FromStr;
    /// let p6 = Prefix6::new(Ipv6Addr::from_str("ff3e::1234").unwrap(), 16);
    /// assert_eq!(p6.value, Ipv6Addr::from_str("ff3e::").unwrap());
    /// ```
    pub fn new(ip: Ipv6Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    fn mask(&self) -> u128 {
        match self.length {
            0 => 0,
            n if n >= Self::HOST_MASK => !0u128,
            n => (!0u128) << (128 - n),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & self.mask() == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value = Ipv6Addr::from_bits(self.value.to_bits() & self.mask())
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix6) -> bool {
        if self.length < other.length {
            return false;
        }
        let mask = other.mask();
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        Prefix6 {
            value: addr,
            length: Self::HOST_MASK,
        }
        .within(self)
    }
}

impl Display for Prefix6 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix6 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) = s
            .split_once('/')
            .ok_or(Error::MalformedPrefix(format!("{s}: missing length")))?;
        let value: Ipv6Addr = value
            .parse()
            .map_err(|_| Error::MalformedPrefix(format!("{s}: bad address")))?;
        let length: u8 = length
            .parse()
            .map_err(|_| Error::MalformedPrefix(format!("{s}: bad length")))?;
        if length > Self::HOST_MASK {
            return Err(Error::MalformedPrefix(format!(
                "{s}: length exceeds {}",
                Self::HOST_MASK
            )));
        }
        Ok(Self::new(value, length))
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
        }
    }
}

impl From<Prefix4> for Prefix {
    fn from(value: Prefix4) -> Self {
        Self::V4(value)
    }
}

impl From<Prefix6> for Prefix {
    fn from(value: Prefix6) -> Self {
        Self::V6(value)
    }
}

impl FromStr for Prefix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, _) = s
            .split_once('/')
            .ok_or(Error::MalformedPrefix(format!("{s}: missing length")))?;
        if value.contains(':') {
            Ok(Self::V6(s.parse()?))
        } else {
            Ok(Self::V4(s.parse()?))
        }
    }
}

impl Prefix {
    pub fn new(ip: IpAddr, length: u8) -> Self {
        match ip {
            IpAddr::V4(ip4) => Self::V4(Prefix4::new(ip4, length)),
            IpAddr::V6(ip6) => Self::V6(Prefix6::new(ip6, length)),
        }
    }

    pub fn length(&self) -> u8 {
        match self {
            Self::V4(p4) => p4.length,
            Self::V6(p6) => p6.length,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4(_) => AddressFamily::Ipv4,
            Self::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        match self {
            Self::V4(p4) => p4.host_bits_are_unset(),
            Self::V6(p6) => p6.host_bits_are_unset(),
        }
    }

    /// Returns false for cross-family comparisons.
    pub fn within(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::V4(a), Prefix::V4(b)) => a.within(b),
            (Prefix::V6(a), Prefix::V6(b)) => a.within(b),
            _ => false,
        }
    }

    /// Returns false for cross-family comparisons.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (Prefix::V4(p), IpAddr::V4(a)) => p.contains(a),
            (Prefix::V6(p), IpAddr::V6(a)) => p.contains(a),
            _ => false,
        }
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum PrefixListAction {
    Permit,
    Deny,
}

impl Display for PrefixListAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permit => write!(f, "permit"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for PrefixListAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permit" => Ok(Self::Permit),
            "deny" => Ok(Self::Deny),
            _ => Err(Error::MalformedStatement(format!(
                "unknown prefix-list action '{s}', must be permit or deny"
            ))),
        }
    }
}

/// What a prefix-list entry matches against.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum PrefixListMatch {
    /// Every address of the list's family. Reports a matched length of 0.
    Any,
    Prefix(Prefix),
}

impl PrefixListMatch {
    /// The matched prefix length if `group` falls within this match.
    pub fn length_matching(&self, group: IpAddr) -> Option<u8> {
        match self {
            Self::Any => Some(0),
            Self::Prefix(p) => p.contains(group).then_some(p.length()),
        }
    }

    pub fn family(&self) -> Option<AddressFamily> {
        match self {
            Self::Any => None,
            Self::Prefix(p) => Some(p.family()),
        }
    }
}

impl From<Prefix> for PrefixListMatch {
    fn from(value: Prefix) -> Self {
        Self::Prefix(value)
    }
}

impl Display for PrefixListMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Prefix(p) => p.fmt(f),
        }
    }
}

impl FromStr for PrefixListMatch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            _ => Ok(Self::Prefix(s.parse()?)),
        }
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, Hash, PartialEq, JsonSchema,
)]
pub struct PrefixListEntry {
    /// Evaluation order within the list, unique per list.
    pub seq: u32,
    pub action: PrefixListAction,
    pub prefix: PrefixListMatch,
}

impl PrefixListEntry {
    pub fn new(
        seq: u32,
        action: PrefixListAction,
        prefix: impl Into<PrefixListMatch>,
    ) -> Self {
        Self {
            seq,
            action,
            prefix: prefix.into(),
        }
    }

    pub fn permit(seq: u32, prefix: impl Into<PrefixListMatch>) -> Self {
        Self::new(seq, PrefixListAction::Permit, prefix)
    }

    pub fn deny(seq: u32, prefix: impl Into<PrefixListMatch>) -> Self {
        Self::new(seq, PrefixListAction::Deny, prefix)
    }
}

impl Display for PrefixListEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "seq {} {} {}", self.seq, self.action, self.prefix)
    }
}

/// The set of groups an RP candidate is willing to serve.
#[derive(
    Debug,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum RpScope {
    /// Groups permitted by the named prefix list.
    PrefixList(String),
    /// Groups within a single range.
    Range(Prefix),
}

impl Display for RpScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrefixList(name) => write!(f, "prefix-list {name}"),
            Self::Range(p) => p.fmt(f),
        }
    }
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Eq, Hash, PartialEq, JsonSchema,
)]
pub struct RpCandidate {
    pub rp: IpAddr,
    pub scope: RpScope,
    /// Lower values are preferred.
    pub priority: u8,
    /// Configuration order. Assigned monotonically and never reused.
    pub order: u64,
}

impl Display for RpCandidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[rp={}, scope={}, priority={}, order={}]",
            self.rp, self.scope, self.priority, self.order
        )
    }
}

/// The outcome of resolving a group against one configuration snapshot.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema,
)]
pub struct ResolvedMapping {
    pub group: IpAddr,
    pub rp: IpAddr,
    /// Length of the prefix that matched the group for the winning RP.
    pub prefix_length: u8,
    /// Configuration order of the winning candidate.
    pub order: u64,
    /// Generation of the configuration snapshot this was resolved against.
    pub generation: u64,
}

impl Display for ResolvedMapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (/{}, order {}, gen {})",
            self.group,
            self.rp,
            self.prefix_length,
            self.order,
            self.generation
        )
    }
}

/// Sent to watchers after every committed configuration change. Watchers
/// holding mappings from an older generation should resolve again.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RpChangeNotification {
    pub generation: u64,
}

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, JsonSchema,
)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}
