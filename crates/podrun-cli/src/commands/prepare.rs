//! `podrun prepare`: prepare a pod for later execution.

use std::collections::BTreeMap;

use clap::Args;
use podrun_runtime::engine::PodSpec;
use podrun_runtime::pod::{PodManifest, RuntimeApp, merge_envs};

use super::Context;
use crate::output::write_pod_id;

/// Description of the pod to prepare, shared by `prepare` and `run`.
#[derive(Args, Debug)]
pub struct PodArgs {
    /// App name.
    #[arg(long, default_value = "app")]
    pub name: String,

    /// Image reference recorded in the manifest.
    #[arg(long, default_value = "local")]
    pub image: String,

    /// Stage-1 image identifier.
    #[arg(long, default_value = "default")]
    pub stage1: String,

    /// Mark the pod as prepared for overlay use.
    #[arg(long)]
    pub overlay: bool,

    /// Pass the host environment to the app.
    #[arg(long)]
    pub inherit_env: bool,

    /// Set an app environment variable (KEY=VALUE). Repeatable.
    #[arg(long = "set-env", value_name = "KEY=VALUE")]
    pub set_env: Vec<String>,

    /// Command to execute inside the pod.
    #[arg(last = true, required = true)]
    pub cmd: Vec<String>,
}

impl PodArgs {
    /// Builds the pod description.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed `--set-env` value.
    pub fn to_spec(&self) -> anyhow::Result<PodSpec> {
        let mut environment = BTreeMap::new();
        merge_envs(&mut environment, self.inherit_env, &self.set_env)?;
        Ok(PodSpec {
            manifest: PodManifest::new(vec![RuntimeApp {
                name: self.name.clone(),
                image: self.image.clone(),
                exec: self.cmd.clone(),
                environment,
            }]),
            stage1_id: self.stage1.clone(),
            overlay: self.overlay,
        })
    }
}

/// Arguments for the `prepare` command.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Pod description.
    #[command(flatten)]
    pub pod: PodArgs,
}

/// Executes the `prepare` command.
///
/// Prints the UUID of the prepared pod on stdout.
///
/// # Errors
///
/// Returns an error if preparation fails.
pub fn execute(ctx: &Context, args: &PrepareArgs) -> anyhow::Result<()> {
    let engine = ctx.engine()?;
    let id = engine.prepare(&args.pod.to_spec()?)?;
    write_pod_id(&mut std::io::stdout().lock(), &id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        pod: PodArgs,
    }

    #[test]
    fn trailing_command_and_env_become_spec() {
        let h = Harness::try_parse_from([
            "prepare",
            "--name",
            "web",
            "--set-env",
            "PORT=8080",
            "--",
            "/bin/server",
            "--verbose",
        ])
        .expect("parse");

        let spec = h.pod.to_spec().expect("spec");
        let app = &spec.manifest.apps[0];
        assert_eq!(app.name, "web");
        assert_eq!(app.exec, vec!["/bin/server", "--verbose"]);
        assert_eq!(app.environment["PORT"], "8080");
        assert!(!spec.overlay);
    }

    #[test]
    fn command_is_required() {
        assert!(Harness::try_parse_from(["prepare", "--name", "web"]).is_err());
    }
}
