//! `podrun run-prepared`: execute a previously prepared pod.

use anyhow::Context as _;
use clap::Args;
use podrun_common::types::PodId;
use podrun_runtime::exec::exec_pod;
use podrun_runtime::lifecycle::Transition;
use podrun_runtime::pod::read_manifest;

use super::Context;

/// Arguments for the `run-prepared` command.
#[derive(Args, Debug)]
pub struct RunPreparedArgs {
    /// UUID of the prepared pod.
    pub uuid: PodId,
}

/// Executes the `run-prepared` command.
///
/// # Errors
///
/// Returns an error if the pod is not prepared, another caller started it
/// first, or exec fails.
pub fn execute(ctx: &Context, args: &RunPreparedArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let run = match engine.run_prepared(args.uuid)? {
        Transition::Done(run) => run,
        Transition::RaceLost => anyhow::bail!("pod {} already started", args.uuid),
    };
    let manifest = read_manifest(run.path())
        .with_context(|| format!("cannot read manifest of pod {}", args.uuid))?;
    let Some(app) = manifest.apps.first() else {
        anyhow::bail!("pod {} has no apps", args.uuid);
    };
    match exec_pod(run, app)? {}
}
