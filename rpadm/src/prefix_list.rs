// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;

use anyhow::{anyhow, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use rpmap::{
    AddressFamily, PrefixListAction, PrefixListMatch, RpMap, Statement,
};
use tabwriter::TabWriter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FamilyArg {
    Ipv4,
    Ipv6,
}

impl From<FamilyArg> for AddressFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Ipv4 => AddressFamily::Ipv4,
            FamilyArg::Ipv6 => AddressFamily::Ipv6,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show prefix lists and their entries.
    Show {
        /// Only show this list.
        name: Option<String>,
    },

    /// Add or replace a prefix list entry.
    Add {
        /// Name of the list.
        name: String,
        /// permit or deny.
        action: PrefixListAction,
        /// Prefix to match, or `any`.
        prefix: PrefixListMatch,
        /// Sequence number, defaults to the next multiple of 5.
        #[arg(long)]
        seq: Option<u32>,
        /// Family of the list, needed when matching `any`.
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,
    },

    /// Remove a prefix list, or one of its entries.
    Remove {
        /// Name of the list.
        name: String,
        /// Only remove the entry with this sequence number.
        #[arg(long)]
        seq: Option<u32>,
    },
}

pub fn commands(command: Commands, map: &RpMap, json: bool) -> Result<()> {
    match command {
        Commands::Show { name } => show(map, name.as_deref(), json)?,
        Commands::Add {
            name,
            action,
            prefix,
            seq,
            family,
        } => {
            let family = match (prefix.family(), family) {
                (Some(f), _) => f,
                (None, Some(f)) => f.into(),
                (None, None) => AddressFamily::Ipv4,
            };
            map.apply(&[Statement::PrefixList {
                family,
                name,
                seq,
                action,
                prefix,
            }])?;
        }
        Commands::Remove { name, seq } => match seq {
            Some(seq) => {
                map.remove_prefix_list_entry(&name, seq)?;
            }
            None => {
                map.remove_prefix_list(&name)?;
            }
        },
    }
    Ok(())
}

fn show(map: &RpMap, name: Option<&str>, json: bool) -> Result<()> {
    let lists: Vec<_> = map
        .prefix_lists()
        .into_iter()
        .filter(|l| match name {
            Some(n) => l.name == n,
            None => true,
        })
        .collect();
    if let (Some(n), true) = (name, lists.is_empty()) {
        return Err(anyhow!("no prefix-list named {n}"));
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
        return Ok(());
    }

    let mut tw = TabWriter::new(std::io::stdout());
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}\t{}",
        "List".dimmed(),
        "Family".dimmed(),
        "Seq".dimmed(),
        "Action".dimmed(),
        "Prefix".dimmed(),
    )?;
    for list in &lists {
        for entry in list.entries.values() {
            writeln!(
                &mut tw,
                "{}\t{}\t{}\t{}\t{}",
                list.name,
                list.family.keyword(),
                entry.seq,
                entry.action,
                entry.prefix
            )?;
        }
    }
    tw.flush()?;
    Ok(())
}
