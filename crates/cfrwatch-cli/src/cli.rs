use cfrwatch_core::{SelectionRule, parse_year};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cfrwatch",
    about = "Compare AVA boundary snapshots against the published 27 CFR part 9 text",
    version
)]
pub struct Cli {
    /// Four-digit CFR edition year; omit to check the consolidated eCFR title
    #[arg(value_parser = year_arg)]
    pub year: Option<String>,

    /// Read the regulation XML from this file instead of fetching it
    #[arg(long)]
    pub document: Option<PathBuf>,

    /// Path to a cfrwatch.toml (defaults to ./cfrwatch.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Snapshot directory to scan, in order (repeatable; replaces configured directories)
    #[arg(long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Representative-feature rule: highest-secondary, lowest-secondary, open-validity, first
    #[arg(long)]
    pub selection: Option<SelectionRule>,

    /// Overall HTTP timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug-level logging (CFRWATCH_LOG overrides)
    #[arg(long, short)]
    pub verbose: bool,
}

fn year_arg(raw: &str) -> Result<String, String> {
    parse_year(raw)
        .map(ToOwned::to_owned)
        .map_err(|err| err.to_string())
}
