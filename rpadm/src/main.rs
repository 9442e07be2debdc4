// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rp_common::cli::cli_style;
use rp_common::log::init_term_logger;
use rpmap::{parse_config, ResolvedMapping, RpConfig, RpMap};
use slog::{info, Logger};
use tabwriter::TabWriter;

mod prefix_list;
mod rp;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    styles = cli_style(),
    infer_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Router configuration to load RP mapping statements from.
    #[arg(short, long, env = "RPADM_CONFIG")]
    config: Option<PathBuf>,

    /// Path of the persistent RP mapping database.
    #[arg(short, long, env = "RPADM_DB")]
    db: Option<String>,

    /// Print results as JSON.
    #[arg(short, long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve multicast groups to their RP.
    Resolve {
        /// Groups to resolve.
        #[arg(required = true)]
        groups: Vec<IpAddr>,
    },

    /// Resolve groups, then show the mapping cache and its counters.
    Mappings {
        /// Groups to resolve before showing the cache.
        groups: Vec<IpAddr>,
    },

    /// RP candidate commands.
    #[command(subcommand)]
    Rp(rp::Commands),

    /// Prefix list commands.
    #[command(subcommand)]
    PrefixList(prefix_list::Commands),

    /// Print the configuration as statements.
    Render,

    /// Check a configuration file without applying it.
    Check {
        /// Configuration file to check.
        file: PathBuf,
    },

    /// Replace the configuration with the statements in a file.
    Import {
        /// Configuration file to import.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = init_term_logger();
    let map = open_map(&cli, log.clone())?;

    match cli.command {
        Commands::Resolve { groups } => resolve(&map, &groups, cli.json)?,
        Commands::Mappings { groups } => mappings(&map, &groups, cli.json)?,
        Commands::Rp(command) => rp::commands(command, &map, cli.json)?,
        Commands::PrefixList(command) => {
            prefix_list::commands(command, &map, cli.json)?
        }
        Commands::Render => print!("{}", map.config().render()),
        Commands::Check { file } => check(&file)?,
        Commands::Import { file } => import(&map, &file, &log)?,
    }
    Ok(())
}

/// Build the engine from the database and configuration file options. The
/// configuration file, when given, is applied on top of whatever the
/// database holds.
fn open_map(cli: &Cli, log: Logger) -> Result<RpMap> {
    let map = match &cli.db {
        Some(path) => RpMap::open(path, log)
            .with_context(|| format!("open database {path}"))?,
        None => RpMap::new(log),
    };
    if let Some(path) = &cli.config {
        let statements = read_statements(path)?;
        map.apply(&statements)
            .with_context(|| format!("apply {}", path.display()))?;
    }
    Ok(map)
}

fn read_statements(path: &Path) -> Result<Vec<rpmap::Statement>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let statements = parse_config(&text)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(statements)
}

fn resolve(map: &RpMap, groups: &[IpAddr], json: bool) -> Result<()> {
    if json {
        let out = resolve_records(map, groups)?;
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut tw = TabWriter::new(std::io::stdout());
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "Group".dimmed(),
        "RP".dimmed(),
        "Prefix".dimmed(),
        "Order".dimmed(),
    )?;
    for group in groups {
        match map.resolve(*group) {
            Ok(m) => write_mapping(&mut tw, &m)?,
            Err(e) => {
                writeln!(&mut tw, "{group}\t{}\t-\t-", e.to_string().red())?
            }
        }
    }
    tw.flush()?;
    Ok(())
}

/// One JSON record per group, an error record for groups with no RP.
fn resolve_records(
    map: &RpMap,
    groups: &[IpAddr],
) -> Result<Vec<serde_json::Value>> {
    let mut out = Vec::new();
    for group in groups {
        let record = match map.resolve(*group) {
            Ok(m) => serde_json::to_value(m)?,
            Err(e) => serde_json::json!({
                "group": group,
                "error": e.to_string(),
            }),
        };
        out.push(record);
    }
    Ok(out)
}

fn write_mapping(
    tw: &mut TabWriter<std::io::Stdout>,
    m: &ResolvedMapping,
) -> Result<()> {
    writeln!(
        tw,
        "{}\t{}\t/{}\t{}",
        m.group, m.rp, m.prefix_length, m.order
    )?;
    Ok(())
}

fn mappings(map: &RpMap, groups: &[IpAddr], json: bool) -> Result<()> {
    for group in groups {
        // unresolvable groups are not cached
        let _ = map.resolve(*group);
    }
    let mappings = map.mappings();
    let stats = map.cache_stats();

    if json {
        let out = serde_json::json!({
            "mappings": mappings,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut tw = TabWriter::new(std::io::stdout());
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "Group".dimmed(),
        "RP".dimmed(),
        "Prefix".dimmed(),
        "Order".dimmed(),
    )?;
    for m in &mappings {
        write_mapping(&mut tw, m)?;
    }
    writeln!(&mut tw)?;
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        "Hits".dimmed(),
        "Misses".dimmed(),
        "Invalidations".dimmed(),
        "Entries".dimmed(),
    )?;
    writeln!(
        &mut tw,
        "{}\t{}\t{}\t{}",
        stats.hits, stats.misses, stats.invalidations, stats.entries
    )?;
    tw.flush()?;
    Ok(())
}

fn check(file: &Path) -> Result<()> {
    let statements = read_statements(file)?;
    let config = RpConfig::from_statements(&statements)
        .with_context(|| format!("check {}", file.display()))?;
    println!(
        "{}: {} statements, {} prefix lists, {} rp candidates",
        file.display(),
        statements.len(),
        config.prefix_lists.len(),
        config.candidates.len(),
    );
    Ok(())
}

fn import(map: &RpMap, file: &Path, log: &Logger) -> Result<()> {
    let statements = read_statements(file)?;
    let config = RpConfig::from_statements(&statements)
        .with_context(|| format!("import {}", file.display()))?;
    map.reload(config)?;
    info!(log, "imported {}", file.display();
        "generation" => map.generation()
    );
    Ok(())
}
