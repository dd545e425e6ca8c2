//! `podrun list`: list every pod and its phase.

use chrono::Utc;
use clap::Args;
use serde::Serialize;

use super::Context;
use crate::output::{format_age, print_corrupt};

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Row {
    uuid: String,
    status: String,
    phase: String,
    changed_at: Option<String>,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if a pod directory cannot be read.
pub fn execute(ctx: &Context, args: &ListArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let listing = engine.list()?;
    print_corrupt(&listing.corrupt);

    if args.json {
        let rows: Vec<_> = listing
            .pods
            .iter()
            .map(|p| Row {
                uuid: p.id.to_string(),
                status: p.phase.status().to_string(),
                phase: p.phase.to_string(),
                changed_at: p.changed_at.map(|t| t.to_rfc3339()),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if listing.pods.is_empty() {
        println!("No pods found.");
        return Ok(());
    }

    let now = Utc::now();
    println!("{:<38} {:<16} {:<16} {:<8}", "UUID", "STATE", "PHASE", "AGE");
    for pod in &listing.pods {
        println!(
            "{:<38} {:<16} {:<16} {:<8}",
            pod.id.to_string(),
            pod.phase.status().to_string(),
            pod.phase.to_string(),
            format_age(pod.changed_at, now),
        );
    }
    Ok(())
}
