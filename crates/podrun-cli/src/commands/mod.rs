//! CLI command definitions and dispatch.

pub mod gc;
pub mod list;
pub mod prepare;
pub mod run;
pub mod run_prepared;
pub mod status;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use podrun_common::config::PodrunConfig;
use podrun_common::constants::ENV_DATA_DIR;
use podrun_runtime::engine::Engine;

/// podrun: daemon-less pod runtime.
#[derive(Parser, Debug)]
#[command(name = "podrun", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Data directory; pods live in `<dir>/pods`.
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub dir: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit log records as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare a pod for later execution and print its UUID.
    Prepare(prepare::PrepareArgs),
    /// Prepare a pod and execute it in place.
    Run(run::RunArgs),
    /// Execute a previously prepared pod.
    RunPrepared(run_prepared::RunPreparedArgs),
    /// Show the status of a pod.
    Status(status::StatusArgs),
    /// List all pods.
    List(list::ListArgs),
    /// Collect exited and failed pods.
    Gc(gc::GcArgs),
}

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration after applying command-line overrides.
    pub config: PodrunConfig,
}

impl Context {
    /// Opens the engine over the configured pods directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the pods directory cannot be created.
    pub fn engine(&self) -> anyhow::Result<Engine> {
        let pods_dir = self.config.pods_dir();
        Engine::from_config(&self.config)
            .with_context(|| format!("cannot open pods directory {}", pods_dir.display()))
    }
}

fn load_context(cli: &Cli) -> anyhow::Result<Context> {
    let mut config = match &cli.config {
        Some(path) => PodrunConfig::load(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => PodrunConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.data_dir.clone_from(dir);
    }
    tracing::debug!(data_dir = %config.data_dir.display(), "configuration loaded");
    Ok(Context { config })
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = load_context(&cli)?;
    match cli.command {
        Command::Prepare(args) => prepare::execute(&ctx, &args),
        Command::Run(args) => run::execute(&ctx, &args),
        Command::RunPrepared(args) => run_prepared::execute(&ctx, &args),
        Command::Status(args) => status::execute(&ctx, &args),
        Command::List(args) => list::execute(&ctx, &args),
        Command::Gc(args) => gc::execute(&ctx, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_flag_overrides_data_dir() {
        let cli = Cli::try_parse_from(["podrun", "--dir", "/tmp/pr", "list"]).expect("parse");
        let ctx = load_context(&cli).expect("context");
        assert_eq!(ctx.config.pods_dir(), PathBuf::from("/tmp/pr/pods"));
    }

    #[test]
    fn log_json_is_a_global_flag() {
        let cli = Cli::try_parse_from(["podrun", "gc", "--log-json"]).expect("parse");
        assert!(cli.log_json);
        assert!(!cli.debug);
    }

    #[test]
    fn command_line_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
