//! `podrun gc`: collect exited and failed pods.

use std::time::Duration;

use clap::Args;
use podrun_common::config::parse_duration;
use podrun_runtime::gc::GcPolicy;

use super::Context;
use crate::output::print_corrupt;

/// Arguments for the `gc` command.
#[derive(Args, Debug)]
pub struct GcArgs {
    /// Minimum time a marked pod stays before deletion (e.g. `30m`).
    #[arg(long, value_parser = duration_arg)]
    pub grace_period: Option<Duration>,

    /// Age after which an unused prepared pod is collected (e.g. `24h`).
    #[arg(long, value_parser = duration_arg)]
    pub expire_prepared: Option<Duration>,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration {s:?}"))
}

/// Executes the `gc` command.
///
/// # Errors
///
/// Returns an error if collection fails or corrupt entries were found.
pub fn execute(ctx: &Context, args: &GcArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let mut policy = GcPolicy::from(&ctx.config.gc);
    if let Some(grace) = args.grace_period {
        policy.grace_period = grace;
    }
    if let Some(expiration) = args.expire_prepared {
        policy.prepared_expiration = expiration;
    }

    let report = engine.gc(policy)?;

    for id in &report.marked_exited {
        println!("Moving exited pod {id} to garbage");
    }
    for id in &report.marked_failed {
        println!("Moving failed prepare {id} to garbage");
    }
    for id in &report.expired_prepared {
        println!("Moving expired prepared pod {id} to garbage");
    }
    for id in &report.swept {
        println!("Garbage collecting pod {id}");
    }
    if report.skipped_busy > 0 || report.skipped_grace > 0 {
        println!(
            "Skipped {} busy and {} recently marked pod(s)",
            report.skipped_busy, report.skipped_grace
        );
    }

    if !report.corrupt.is_empty() {
        print_corrupt(&report.corrupt);
        anyhow::bail!("{} corrupt entries in pods directory", report.corrupt.len());
    }
    Ok(())
}
