//! `podrun run`: prepare a pod and execute it in place.

use clap::Args;
use podrun_runtime::exec::exec_pod;

use super::Context;
use super::prepare::PodArgs;
use crate::output::write_pod_id;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pod description.
    #[command(flatten)]
    pub pod: PodArgs,
}

/// Executes the `run` command.
///
/// Prints the pod UUID on stdout, like `prepare`. On success this process
/// is then replaced by the pod's command and never returns.
///
/// # Errors
///
/// Returns an error if preparation or exec fails.
pub fn execute(ctx: &Context, args: &RunArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let spec = args.pod.to_spec()?;
    let run = engine.prepare_for_run(&spec)?;
    write_pod_id(&mut std::io::stdout().lock(), run.id())?;
    match exec_pod(run, &spec.manifest.apps[0])? {}
}
