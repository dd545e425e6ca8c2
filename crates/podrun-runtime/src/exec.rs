//! Handing a running pod over to the process that executes it.
//!
//! The executing process inherits the run lock and must keep it open for
//! as long as the pod is alive; its exit is the pod's exit.

use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use podrun_common::error::{PodrunError, Result};
use podrun_core::handoff::inherit_lock;

use crate::lifecycle::RunRef;
use crate::pod::RuntimeApp;

/// Builds the command that executes an app of a running pod, with the run
/// lock inherited and the pod directory as working directory.
///
/// # Errors
///
/// Returns an error if the app has no exec command.
pub fn pod_command(run: &RunRef, app: &RuntimeApp) -> Result<Command> {
    let Some((program, args)) = app.exec.split_first() else {
        return Err(PodrunError::Config {
            message: format!("app {} has no exec command", app.name),
        });
    };
    let mut cmd = Command::new(program);
    let _ = cmd
        .args(args)
        .envs(&app.environment)
        .current_dir(run.path());
    inherit_lock(&mut cmd, run.lock());
    Ok(cmd)
}

/// Replaces the current process with the pod's command.
///
/// Only returns on failure; the pod is then left Exited, since the lock
/// dies with this process.
///
/// # Errors
///
/// Returns an error if the command cannot be executed.
pub fn exec_pod(run: RunRef, app: &RuntimeApp) -> Result<Infallible> {
    let mut cmd = pod_command(&run, app)?;
    crate::pod::write_pid(run.path(), std::process::id())?;
    tracing::info!(id = %run.id(), app = %app.name, cmd = ?app.exec, "executing pod");
    let err = cmd.exec();
    Err(PodrunError::io(cmd.get_program(), err))
}

/// Starts the pod's command as a child process and hands it the lock.
///
/// This process's own descriptor is closed before returning, so the child
/// is the lock's only owner.
///
/// # Errors
///
/// Returns an error if the command cannot be spawned or its pid cannot be
/// recorded. A spawned child is then killed and reaped, so the lock is
/// released and the pod reads as Exited.
pub fn spawn_pod(run: RunRef, app: &RuntimeApp) -> Result<Child> {
    let mut cmd = pod_command(&run, app)?;
    let mut child = cmd
        .spawn()
        .map_err(|e| PodrunError::io(cmd.get_program(), e))?;
    if let Err(e) = crate::pod::write_pid(run.path(), child.id()) {
        tracing::warn!(
            id = %run.id(),
            pid = child.id(),
            error = %e,
            "cannot record pod pid, killing pod process"
        );
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }
    tracing::info!(id = %run.id(), app = %app.name, pid = child.id(), "pod process started");
    drop(run);
    Ok(child)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ffi::OsStr;

    use podrun_common::constants::{ENV_LOCK_FD, PID_FILE};
    use podrun_common::types::PodId;
    use podrun_core::lock::{Acquire, Blocking, DirLock, LockMode};

    use super::*;
    use crate::layout::PodDirs;
    use crate::lifecycle::Lifecycle;

    fn running_pod(tmp: &tempfile::TempDir) -> RunRef {
        let dirs = PodDirs::new(tmp.path());
        dirs.init().expect("init");
        let lifecycle = Lifecycle::new(dirs);
        let embryo = lifecycle.create_embryo(PodId::generate()).expect("embryo");
        let prepare = lifecycle.enter_prepare(embryo).expect("prepare");
        lifecycle.prepare_succeeded_to_run(prepare).expect("run")
    }

    fn app(exec: &[&str]) -> RuntimeApp {
        let mut environment = BTreeMap::new();
        let _ = environment.insert("GREETING".to_string(), "hello".to_string());
        RuntimeApp {
            name: "app".into(),
            image: "example.com/app".into(),
            exec: exec.iter().map(ToString::to_string).collect(),
            environment,
        }
    }

    #[test]
    fn command_runs_in_pod_dir_with_app_env() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let run = running_pod(&tmp);

        let cmd = pod_command(&run, &app(&["/bin/true", "-x"])).expect("command");

        assert_eq!(cmd.get_program(), "/bin/true");
        assert_eq!(cmd.get_current_dir(), Some(run.path()));
        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("GREETING"), Some(OsStr::new("hello")))));
        assert!(envs.iter().any(|(k, _)| *k == OsStr::new(ENV_LOCK_FD)));
    }

    #[test]
    fn empty_exec_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let run = running_pod(&tmp);
        assert!(matches!(
            pod_command(&run, &app(&[])),
            Err(PodrunError::Config { .. })
        ));
    }

    #[test]
    fn spawn_records_child_pid() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let run = running_pod(&tmp);
        let dir = run.path().to_path_buf();

        let mut child = spawn_pod(run, &app(&["/bin/true"])).expect("spawn");
        let pid = child.id();
        let _ = child.wait().expect("wait");

        assert_eq!(crate::pod::read_pid(&dir).expect("pid"), Some(pid));
    }

    #[test]
    fn failed_pid_record_kills_child_and_frees_lock() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let run = running_pod(&tmp);
        let dir = run.path().to_path_buf();
        // A directory in place of the pid file makes the write fail.
        std::fs::create_dir(dir.join(PID_FILE)).expect("mkdir");

        let result = spawn_pod(run, &app(&["/bin/sleep", "30"]));

        assert!(matches!(result, Err(PodrunError::Io { .. })));
        let probe = DirLock::acquire(&dir, LockMode::Exclusive, Blocking::NoWait).expect("lock");
        assert!(matches!(probe, Acquire::Locked(_)));
    }
}
