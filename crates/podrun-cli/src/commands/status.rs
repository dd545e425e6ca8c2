//! `podrun status`: show the status of a pod.

use clap::Args;
use podrun_common::error::PodrunError;
use podrun_common::types::{PodId, PodStatus};

use super::Context;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// UUID of the pod.
    pub uuid: PodId,

    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `status` command.
///
/// A missing pod prints `not-found` rather than failing.
///
/// # Errors
///
/// Returns an error on I/O failure or corrupt state.
pub fn execute(ctx: &Context, args: &StatusArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let (status, phase, pid) = match engine.info(&args.uuid) {
        Ok(info) => (info.phase.status(), Some(info.phase), info.pid),
        Err(PodrunError::NotFound { .. }) => (PodStatus::NotFound, None, None),
        Err(e) => return Err(e.into()),
    };

    if args.json {
        let doc = serde_json::json!({
            "uuid": args.uuid.to_string(),
            "status": status.to_string(),
            "phase": phase.map(|p| p.to_string()),
            "pid": pid,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("state={status}");
    if let Some(pid) = pid {
        println!("pid={pid}");
    }
    Ok(())
}
