// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RP mapping configuration snapshots and their statement form.
//!
//! A configuration is expressed as an unordered batch of two statement
//! kinds, in the syntax routers already use for them.
//!
//! ```text
//! ip pim rp 192.168.0.11 prefix-list rp-pl-1
//! ip pim rp 192.168.0.20 232.0.0.0/8 priority 10
//! ip prefix-list rp-pl-1 seq 10 permit 239.100.0.0/28
//! ipv6 prefix-list rp6 seq 5 deny any
//! ```
//!
//! Candidates may reference lists defined later in the same batch; references
//! are checked once the whole batch has been applied. Rendering a snapshot
//! back to statements and loading them again yields an equivalent snapshot.

use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use crate::candidate::CandidateTable;
use crate::error::Error;
use crate::prefix_list::PrefixListStore;
use crate::types::{
    AddressFamily, Prefix, PrefixListAction, PrefixListEntry,
    PrefixListMatch, RpCandidate, RpScope,
};
use crate::DEFAULT_RP_PRIORITY;

/// An immutable-once-committed view of the RP mapping configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpConfig {
    pub(crate) generation: u64,
    pub prefix_lists: PrefixListStore,
    pub candidates: CandidateTable,
}

impl RpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validated configuration from a batch of statements.
    pub fn from_statements<'a>(
        statements: impl IntoIterator<Item = &'a Statement>,
    ) -> Result<Self, Error> {
        let mut config = Self::new();
        config.apply_batch(statements)?;
        Ok(config)
    }

    /// The generation of the engine commit that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a single statement without checking list references.
    pub fn apply(&mut self, statement: &Statement) -> Result<(), Error> {
        match statement {
            Statement::PrefixList {
                family,
                name,
                seq,
                action,
                prefix,
            } => {
                let seq = match seq {
                    Some(seq) => *seq,
                    None => self.prefix_lists.next_seq(name)?,
                };
                self.prefix_lists.add_entry(
                    *family,
                    name,
                    PrefixListEntry::new(seq, *action, *prefix),
                )?;
            }
            Statement::Rp {
                rp,
                scope,
                priority,
            } => {
                self.candidates.add(*rp, scope.clone(), *priority);
            }
        }
        Ok(())
    }

    /// Apply every statement, then validate. The first failing statement is
    /// named in the returned error. On error `self` may be partially
    /// modified; callers wanting atomicity apply to a copy.
    pub fn apply_batch<'a>(
        &mut self,
        statements: impl IntoIterator<Item = &'a Statement>,
    ) -> Result<(), Error> {
        let statements: Vec<&Statement> = statements.into_iter().collect();
        for s in &statements {
            self.apply(s).map_err(|e| Error::Rejected {
                statement: s.to_string(),
                source: Box::new(e),
            })?;
        }
        for c in self.candidates.iter() {
            if let Err(e) = self.check_candidate(c) {
                let offender = statements.iter().find(|s| {
                    matches!(
                        s,
                        Statement::Rp { rp, scope, .. }
                            if *rp == c.rp && *scope == c.scope
                    )
                });
                return Err(match offender {
                    Some(s) => Error::Rejected {
                        statement: s.to_string(),
                        source: Box::new(e),
                    },
                    None => e,
                });
            }
        }
        Ok(())
    }

    /// Check that every candidate's prefix list exists and that every
    /// candidate serves groups of its own address family.
    pub fn validate(&self) -> Result<(), Error> {
        self.candidates
            .iter()
            .try_for_each(|c| self.check_candidate(c))
    }

    fn check_candidate(&self, c: &RpCandidate) -> Result<(), Error> {
        let family = match &c.scope {
            RpScope::PrefixList(name) => {
                self.prefix_lists
                    .get(name)
                    .ok_or_else(|| Error::UnknownList(name.clone()))?
                    .family
            }
            RpScope::Range(range) => range.family(),
        };
        if family != AddressFamily::of(c.rp) {
            return Err(Error::Conflict(format!(
                "rp {} cannot serve {} groups of {}",
                c.rp,
                family.keyword(),
                c.scope
            )));
        }
        Ok(())
    }

    /// Render this configuration as statements: prefix lists by name and
    /// sequence, then candidates in configuration order.
    pub fn statements(&self) -> Vec<Statement> {
        let lists = self.prefix_lists.iter().flat_map(|list| {
            list.entries.values().map(|e| Statement::PrefixList {
                family: list.family,
                name: list.name.clone(),
                seq: Some(e.seq),
                action: e.action,
                prefix: e.prefix,
            })
        });
        let candidates = self.candidates.iter().map(|c| Statement::Rp {
            rp: c.rp,
            scope: c.scope.clone(),
            priority: c.priority,
        });
        lists.chain(candidates).collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for s in self.statements() {
            out.push_str(&s.to_string());
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `ip|ipv6 prefix-list <name> [seq <n>] permit|deny <prefix>|any`
    PrefixList {
        family: AddressFamily,
        name: String,
        seq: Option<u32>,
        action: PrefixListAction,
        prefix: PrefixListMatch,
    },
    /// `ip|ipv6 pim rp <addr> [prefix-list <name> | <range>] [priority <n>]`
    Rp {
        rp: IpAddr,
        scope: RpScope,
        priority: u8,
    },
}

impl Statement {
    /// Is `line` one of the statement kinds this module understands. Other
    /// router configuration (interfaces, debug flags, rp timers, prefix-list
    /// descriptions and sequence-number settings) is not.
    pub fn recognized(line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().take(4).collect();
        match tokens.as_slice() {
            ["ip" | "ipv6", "pim", "rp", rp] => rp.parse::<IpAddr>().is_ok(),
            ["ip" | "ipv6", "prefix-list", _, "seq" | "permit" | "deny"] => {
                true
            }
            _ => false,
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Statement::PrefixList {
                family,
                name,
                seq,
                action,
                prefix,
            } => {
                write!(f, "{} prefix-list {name}", family.keyword())?;
                if let Some(seq) = seq {
                    write!(f, " seq {seq}")?;
                }
                write!(f, " {action} {prefix}")
            }
            Statement::Rp {
                rp,
                scope,
                priority,
            } => {
                write!(
                    f,
                    "{} pim rp {rp} {scope}",
                    AddressFamily::of(*rp).keyword()
                )?;
                if *priority != DEFAULT_RP_PRIORITY {
                    write!(f, " priority {priority}")?;
                }
                Ok(())
            }
        }
    }
}

fn malformed(s: &str, why: &str) -> Error {
    Error::MalformedStatement(format!("'{s}': {why}"))
}

impl FromStr for Statement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        match tokens.as_slice() {
            [family, "prefix-list", name, rest @ ..] => {
                let family: AddressFamily = family.parse()?;
                let (seq, rest) = match rest {
                    ["seq", seq, rest @ ..] => {
                        let seq = seq
                            .parse()
                            .map_err(|_| malformed(s, "bad sequence number"))?;
                        (Some(seq), rest)
                    }
                    _ => (None, rest),
                };
                let [action, prefix] = rest else {
                    return Err(malformed(
                        s,
                        "expected permit|deny <prefix>|any",
                    ));
                };
                let prefix: PrefixListMatch = prefix.parse()?;
                if let Some(pf) = prefix.family() {
                    if pf != family {
                        return Err(malformed(s, "prefix family mismatch"));
                    }
                }
                Ok(Statement::PrefixList {
                    family,
                    name: name.to_string(),
                    seq,
                    action: action.parse()?,
                    prefix,
                })
            }
            [family, "pim", "rp", rp, rest @ ..] => {
                let family: AddressFamily = family.parse()?;
                let rp: IpAddr =
                    rp.parse().map_err(|_| malformed(s, "bad rp address"))?;
                if AddressFamily::of(rp) != family {
                    return Err(malformed(s, "rp address family mismatch"));
                }
                let (scope, rest) = match rest {
                    ["prefix-list", name, rest @ ..] => {
                        (RpScope::PrefixList(name.to_string()), rest)
                    }
                    [range, rest @ ..] if *range != "priority" => {
                        let range: Prefix = range.parse()?;
                        if range.family() != family {
                            return Err(malformed(
                                s,
                                "group range family mismatch",
                            ));
                        }
                        (RpScope::Range(range), rest)
                    }
                    _ => (RpScope::Range(family.default_group_range()), rest),
                };
                let priority = match rest {
                    [] => DEFAULT_RP_PRIORITY,
                    ["priority", p] => {
                        p.parse().map_err(|_| malformed(s, "bad priority"))?
                    }
                    _ => return Err(malformed(s, "unexpected trailing input")),
                };
                Ok(Statement::Rp {
                    rp,
                    scope,
                    priority,
                })
            }
            _ => Err(malformed(s, "unrecognized statement")),
        }
    }
}

/// Parse the RP mapping statements out of a router configuration file.
///
/// Blank lines, `!` and `#` comments and configuration this module does not
/// own are skipped. A recognized statement that fails to parse is reported
/// with its line number.
pub fn parse_config(text: &str) -> Result<Vec<Statement>, Error> {
    let mut statements = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
            continue;
        }
        if !Statement::recognized(line) {
            continue;
        }
        let statement = line.parse().map_err(|e| Error::Statement {
            line: i + 1,
            source: Box::new(e),
        })?;
        statements.push(statement);
    }
    Ok(statements)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::PIM_ACL_R1;
    use pretty_assertions::assert_eq;
    use rp_common::{cidr, ip};

    #[test]
    fn test_parse_pim_acl_r1() {
        let statements = parse_config(PIM_ACL_R1).expect("parse");
        assert_eq!(statements.len(), 11);
        assert_eq!(
            statements[0],
            Statement::Rp {
                rp: ip!("192.168.0.11"),
                scope: RpScope::PrefixList("rp-pl-1".into()),
                priority: DEFAULT_RP_PRIORITY,
            }
        );
        let p25: Prefix = cidr!("239.100.0.128/25");
        assert!(statements.contains(&Statement::PrefixList {
            family: AddressFamily::Ipv4,
            name: "rp-pl-4".into(),
            seq: Some(10),
            action: PrefixListAction::Permit,
            prefix: PrefixListMatch::Prefix(p25),
        }));
    }

    #[test]
    fn test_forward_references_in_batch() {
        let statements = parse_config(PIM_ACL_R1).expect("parse");
        let config = RpConfig::from_statements(&statements).expect("config");
        assert_eq!(config.candidates.len(), 5);
        assert_eq!(config.prefix_lists.len(), 5);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let statements = parse_config(
            "ip pim rp 192.168.0.11 prefix-list rp-pl-1\n\
             ip pim rp 192.168.0.12 prefix-list nope\n\
             ip prefix-list rp-pl-1 seq 10 permit 239.100.0.0/28\n",
        )
        .expect("parse");
        let err = RpConfig::from_statements(&statements).unwrap_err();
        match err {
            Error::Rejected { statement, source } => {
                assert_eq!(
                    statement,
                    "ip pim rp 192.168.0.12 prefix-list nope"
                );
                assert!(matches!(*source, Error::UnknownList(_)));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_malformed_prefix_reports_line() {
        let err = parse_config(
            "!\nip prefix-list a seq 10 permit 239.100.0.0/28\n\
             ip prefix-list a seq 20 permit 239.100.0.0/33\n",
        )
        .unwrap_err();
        match err {
            Error::Statement { line, source } => {
                assert_eq!(line, 3);
                assert!(matches!(*source, Error::MalformedPrefix(_)));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_unrelated_pim_and_prefix_list_lines_skipped() {
        let text = format!(
            "{PIM_ACL_R1}\
             ip pim rp keep-alive-timer 185\n\
             ipv6 pim rp keep-alive-timer 185\n\
             ip prefix-list sequence-number\n\
             no ip prefix-list sequence-number\n\
             ip prefix-list rp-pl-1 description first rp\n"
        );
        let statements = parse_config(&text).expect("parse");
        assert_eq!(statements.len(), 11);
    }

    #[test]
    fn test_recognized() {
        assert!(Statement::recognized("ip pim rp 10.0.0.1"));
        assert!(Statement::recognized("ipv6 pim rp 2001:db8::1 ff3e::/16"));
        assert!(Statement::recognized("ip prefix-list a seq 5 deny any"));
        assert!(Statement::recognized("ip prefix-list a permit 239.0.0.0/8"));
        assert!(!Statement::recognized("ip pim rp keep-alive-timer 185"));
        assert!(!Statement::recognized("ip pim rp"));
        assert!(!Statement::recognized("ip prefix-list sequence-number"));
        assert!(!Statement::recognized("ip prefix-list a description x"));
    }

    #[test]
    fn test_rp_family_must_match_scope() {
        assert!(matches!(
            "ip pim rp 10.0.0.1 ff3e::/16".parse::<Statement>(),
            Err(Error::MalformedStatement(_))
        ));

        let statements = parse_config(
            "ipv6 prefix-list six seq 5 permit ff3e::/16\n\
             ip pim rp 10.0.0.1 prefix-list six\n",
        )
        .expect("parse");
        let err = RpConfig::from_statements(&statements).unwrap_err();
        match err {
            Error::Rejected { statement, source } => {
                assert_eq!(statement, "ip pim rp 10.0.0.1 prefix-list six");
                assert!(matches!(*source, Error::Conflict(_)));
            }
            other => panic!("unexpected error {other}"),
        }

        let mut config = RpConfig::new();
        config.candidates.add(
            ip!("10.0.0.1"),
            RpScope::Range(cidr!("ff3e::/16")),
            DEFAULT_RP_PRIORITY,
        );
        assert!(matches!(config.validate(), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_rp_forms() {
        let s: Statement = "ip pim rp 10.0.0.1".parse().unwrap();
        assert_eq!(
            s,
            Statement::Rp {
                rp: ip!("10.0.0.1"),
                scope: RpScope::Range(cidr!("224.0.0.0/4")),
                priority: DEFAULT_RP_PRIORITY,
            }
        );

        let s: Statement =
            "ip pim rp 10.0.0.1 232.0.0.0/8 priority 3".parse().unwrap();
        assert_eq!(s.to_string(), "ip pim rp 10.0.0.1 232.0.0.0/8 priority 3");

        let s: Statement = "ip pim rp 10.0.0.1 priority 3".parse().unwrap();
        assert_eq!(s.to_string(), "ip pim rp 10.0.0.1 224.0.0.0/4 priority 3");

        let s: Statement = "ipv6 pim rp 2001:db8::1".parse().unwrap();
        assert_eq!(s.to_string(), "ipv6 pim rp 2001:db8::1 ff00::/8");

        assert!("ip pim rp 2001:db8::1".parse::<Statement>().is_err());
        assert!("ip pim rp 10.0.0.1 prefix-list".parse::<Statement>().is_err());
        assert!("ip pim rp 10.0.0.1 priority x".parse::<Statement>().is_err());
    }

    #[test]
    fn test_prefix_list_forms() {
        let s: Statement =
            "ipv6 prefix-list six deny any".parse().expect("parse");
        assert_eq!(s.to_string(), "ipv6 prefix-list six deny any");

        assert!("ip prefix-list a seq 5 allow 239.0.0.0/8"
            .parse::<Statement>()
            .is_err());
        assert!("ip prefix-list a seq 5 permit ff3e::/16"
            .parse::<Statement>()
            .is_err());
        assert!("ip prefix-list a seq 5 permit 239.0.0.0/8 le 32"
            .parse::<Statement>()
            .is_err());
    }

    #[test]
    fn test_auto_sequence() {
        let statements = parse_config(
            "ip prefix-list a permit 239.1.0.0/16\n\
             ip prefix-list a permit 239.2.0.0/16\n\
             ip prefix-list a seq 12 deny any\n\
             ip prefix-list a permit 239.3.0.0/16\n",
        )
        .expect("parse");
        let config = RpConfig::from_statements(&statements).expect("config");
        let seqs: Vec<u32> = config
            .prefix_lists
            .get("a")
            .expect("list")
            .entries
            .keys()
            .copied()
            .collect();
        assert_eq!(seqs, vec![5, 10, 12, 15]);
    }

    #[test]
    fn test_render_round_trip() {
        let statements = parse_config(PIM_ACL_R1).expect("parse");
        let config = RpConfig::from_statements(&statements).expect("config");
        let rendered = config.render();

        let again = RpConfig::from_statements(
            &parse_config(&rendered).expect("reparse"),
        )
        .expect("config");
        assert_eq!(again, config);
        assert_eq!(again.render(), rendered);
    }
}
