// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;
use std::net::IpAddr;

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use rpmap::{AddressFamily, Prefix, RpMap, RpScope, DEFAULT_RP_PRIORITY};
use tabwriter::TabWriter;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show RP candidates in configuration order.
    Info,

    /// Add an RP candidate.
    Add(AddCandidate),

    /// Remove an RP candidate.
    Remove {
        /// Address of the RP.
        rp: IpAddr,
        /// Only remove the candidate serving this prefix list.
        #[arg(long)]
        prefix_list: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct AddCandidate {
    /// Address of the RP.
    rp: IpAddr,

    /// Serve the groups permitted by this prefix list.
    #[arg(long, conflicts_with = "range")]
    prefix_list: Option<String>,

    /// Serve the groups within this range. Defaults to all multicast
    /// groups of the RP's address family.
    #[arg(long)]
    range: Option<Prefix>,

    /// Preference among equally specific candidates, lower wins.
    #[arg(long, default_value_t = DEFAULT_RP_PRIORITY)]
    priority: u8,
}

pub fn commands(command: Commands, map: &RpMap, json: bool) -> Result<()> {
    match command {
        Commands::Info => info(map, json)?,
        Commands::Add(add) => {
            let scope = match (add.prefix_list, add.range) {
                (Some(name), _) => RpScope::PrefixList(name),
                (None, Some(range)) => RpScope::Range(range),
                (None, None) => RpScope::Range(
                    AddressFamily::of(add.rp).default_group_range(),
                ),
            };
            let order = map.add_candidate(add.rp, scope, add.priority)?;
            println!("rp {} added with order {order}", add.rp);
        }
        Commands::Remove { rp, prefix_list } => match prefix_list {
            Some(name) => {
                map.remove_candidate_scoped(rp, &RpScope::PrefixList(name))?;
            }
            None => {
                map.remove_candidate(rp)?;
            }
        },
    }
    Ok(())
}

fn info(map: &RpMap, json: bool) -> Result<()> {
    let candidates = map.rp_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    let mut tw = TabWriter::new(std::io::stdout());
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "RP".dimmed(),
        "Groups".dimmed(),
        "Priority".dimmed(),
        "Order".dimmed(),
    )?;
    for c in &candidates {
        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}",
            c.rp, c.scope, c.priority, c.order
        )?;
    }
    tw.flush()?;
    Ok(())
}
