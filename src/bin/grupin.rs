//! Grupin CLI
//!
//! Validates a declaration and, given a prior one, prints what changed.

use anyhow::Context;
use clap::Parser;
use grupin_rs::{Grupin, GrupinDiff, Identifier, Reconciler};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "grupin")]
#[command(about = "Validate data product declarations and diff them against a prior version")]
struct Args {
    /// Path to the current declaration
    current: PathBuf,

    /// Path to the prior declaration to diff against
    #[arg(short = 'o', long)]
    old: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    products: usize,
    user_groups: usize,
    units: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<&'a GrupinDiff>,
}

fn load(path: &PathBuf) -> anyhow::Result<Grupin> {
    Grupin::from_yaml_file(path).with_context(|| format!("invalid declaration {}", path.display()))
}

fn print_ids(label: &str, ids: &BTreeSet<Identifier>) {
    for id in ids {
        println!("  {} {}", label, id);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Loading declaration {:?}", args.current);
    let current = load(&args.current)?;
    let diff = match &args.old {
        Some(old) => {
            info!("Diffing against {:?}", old);
            Some(GrupinDiff::between(&load(old)?, &current))
        }
        None => None,
    };

    let summary = Summary {
        products: current.products.len(),
        user_groups: current.user_groups.len(),
        units: Reconciler::units(&current).len(),
        diff: diff.as_ref(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{}: {} products, {} user groups, {} reconciliation units",
        args.current.display(),
        summary.products,
        summary.user_groups,
        summary.units
    );
    if let Some(diff) = &diff {
        if diff.is_empty() {
            println!("No changes");
        } else {
            print_ids("+ product", &diff.created);
            print_ids("- product", &diff.deleted);
            print_ids("~ product", &diff.updated);
            print_ids("+ user group", &diff.user_groups_created);
            print_ids("- user group", &diff.user_groups_deleted);
        }
    }
    Ok(())
}
