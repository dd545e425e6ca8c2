//! Runtime engine that drives pods through their lifecycle.

use std::path::{Path, PathBuf};

use podrun_common::config::PodrunConfig;
use podrun_common::error::{PodrunError, Result};
use podrun_common::types::{Phase, PodId, PodStatus};

use crate::gc::{Collector, GcPolicy, GcReport};
use crate::layout::PodDirs;
use crate::lifecycle::{Lifecycle, PrepareRef, RunRef, Transition};
use crate::pod::{self, PodManifest};
use crate::pulse::{self, Listing};

/// Everything preparation needs to populate a pod directory.
#[derive(Debug, Clone)]
pub struct PodSpec {
    /// Apps to run.
    pub manifest: PodManifest,
    /// Stage-1 image identifier recorded for the execution side.
    pub stage1_id: String,
    /// Whether to mark the pod as prepared for overlay use.
    pub overlay: bool,
}

/// Details about a single pod.
#[derive(Debug, Clone)]
pub struct PodInfo {
    /// Pod identifier.
    pub id: PodId,
    /// Phase at sampling time.
    pub phase: Phase,
    /// Pod manifest, once preparation has written one.
    pub manifest: Option<PodManifest>,
    /// Stage-1 image identifier, once written.
    pub stage1_id: Option<String>,
    /// Whether the pod was prepared for overlay use.
    pub overlay: bool,
    /// Pid of the pod process while it is running.
    pub pid: Option<u32>,
}

/// The engine that coordinates all pod operations.
///
/// Holds no state of its own besides the pods root: every answer is
/// re-derived from the directory set.
#[derive(Debug, Clone)]
pub struct Engine {
    lifecycle: Lifecycle,
}

impl Engine {
    /// Creates an engine over `pods_dir`, creating the layout if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod directories cannot be created.
    pub fn new(pods_dir: impl Into<PathBuf>) -> Result<Self> {
        let dirs = PodDirs::new(pods_dir);
        dirs.init()?;
        Ok(Self {
            lifecycle: Lifecycle::new(dirs),
        })
    }

    /// Creates an engine for the pods root named by a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod directories cannot be created.
    pub fn from_config(config: &PodrunConfig) -> Result<Self> {
        Self::new(config.pods_dir())
    }

    /// Returns the pods root.
    #[must_use]
    pub fn pods_dir(&self) -> &Path {
        self.lifecycle.dirs().root()
    }

    /// Returns the underlying state machine.
    #[must_use]
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Prepares a new pod and leaves it in `prepared/`.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails; the pod is then left
    /// prepare-failed for the collector.
    pub fn prepare(&self, spec: &PodSpec) -> Result<PodId> {
        let prepare = self.begin(spec)?;
        let prepared = self.lifecycle.prepare_succeeded_to_prepared(prepare)?;
        Ok(*prepared.id())
    }

    /// Prepares a new pod and moves it straight into `run/`, locked.
    ///
    /// # Errors
    ///
    /// Returns an error if preparation fails; the pod is then left
    /// prepare-failed for the collector.
    pub fn prepare_for_run(&self, spec: &PodSpec) -> Result<RunRef> {
        let prepare = self.begin(spec)?;
        self.lifecycle.prepare_succeeded_to_run(prepare)
    }

    /// Moves a prepared pod into `run/`, locked.
    ///
    /// # Errors
    ///
    /// Returns an error if the pod is not prepared or cannot be moved.
    pub fn run_prepared(&self, id: PodId) -> Result<Transition<RunRef>> {
        let prepared = self.lifecycle.open_prepared(id)?;
        self.lifecycle.resume_from_prepared(prepared)
    }

    /// Samples a pod's status.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or corrupt state.
    pub fn status(&self, id: &PodId) -> Result<PodStatus> {
        pulse::query_status(self.lifecycle.dirs(), id)
    }

    /// Samples a pod's full phase.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or corrupt state.
    pub fn phase(&self, id: &PodId) -> Result<Option<Phase>> {
        pulse::probe_phase(self.lifecycle.dirs(), id)
    }

    /// Lists every pod.
    ///
    /// # Errors
    ///
    /// Returns an error if a pod directory cannot be read.
    pub fn list(&self) -> Result<Listing> {
        pulse::list_pods(self.lifecycle.dirs())
    }

    /// Collects details about one pod.
    ///
    /// Metadata is read best-effort: the pod may move or disappear while
    /// it is being read.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::NotFound`] if the pod does not exist.
    pub fn info(&self, id: &PodId) -> Result<PodInfo> {
        let Some(phase) = self.phase(id)? else {
            return Err(PodrunError::NotFound {
                kind: "pod",
                id: id.to_string(),
            });
        };
        let dir = self.current_dir(id)?;
        let manifest = dir.as_deref().and_then(|d| pod::read_manifest(d).ok());
        let stage1_id = dir.as_deref().and_then(|d| pod::read_stage1_id(d).ok());
        let overlay = dir
            .as_deref()
            .is_some_and(|d| pod::prepared_with_overlay(d).unwrap_or(false));
        let pid = match (phase, dir.as_deref()) {
            (Phase::Running, Some(d)) => pod::read_pid(d)?.filter(|pid| pod::pid_alive(*pid)),
            _ => None,
        };
        Ok(PodInfo {
            id: *id,
            phase,
            manifest,
            stage1_id,
            overlay,
            pid,
        })
    }

    /// Runs a garbage collection.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failures unrelated to racing actors.
    pub fn gc(&self, policy: GcPolicy) -> Result<GcReport> {
        Collector::new(self.lifecycle.dirs(), policy).collect()
    }

    /// Creates, claims and populates a new pod.
    fn begin(&self, spec: &PodSpec) -> Result<PrepareRef> {
        let embryo = self.lifecycle.create_embryo(PodId::generate())?;
        let prepare = self.lifecycle.enter_prepare(embryo)?;
        if let Err(e) = pod::write_pod_metadata(
            prepare.path(),
            &spec.manifest,
            &spec.stage1_id,
            spec.overlay,
        ) {
            tracing::warn!(id = %prepare.id(), error = %e, "preparation failed");
            self.lifecycle.prepare_failed(prepare);
            return Err(e);
        }
        Ok(prepare)
    }

    fn current_dir(&self, id: &PodId) -> Result<Option<PathBuf>> {
        let dirs = self.lifecycle.dirs();
        for location in podrun_common::types::Location::ALL {
            if dirs.contains(location, id)? {
                return Ok(Some(dirs.pod_path(location, id)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::pod::RuntimeApp;

    fn spec(exec: Vec<String>) -> PodSpec {
        PodSpec {
            manifest: PodManifest::new(vec![RuntimeApp {
                name: "app".into(),
                image: "example.com/app".into(),
                exec,
                environment: BTreeMap::new(),
            }]),
            stage1_id: "stage1-test".into(),
            overlay: false,
        }
    }

    #[test]
    fn prepare_leaves_pod_prepared_with_metadata() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(tmp.path()).expect("engine");

        let id = engine.prepare(&spec(vec!["/bin/true".into()])).expect("prepare");
        assert_eq!(engine.status(&id).expect("status"), PodStatus::Prepared);

        let info = engine.info(&id).expect("info");
        assert_eq!(info.stage1_id.as_deref(), Some("stage1-test"));
        assert!(!info.overlay);
        assert_eq!(info.manifest.expect("manifest").apps[0].exec, vec!["/bin/true"]);
        assert!(info.pid.is_none());
    }

    #[test]
    fn invalid_spec_leaves_prepare_failed_pod() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(tmp.path()).expect("engine");

        let err = engine.prepare(&spec(Vec::new())).unwrap_err();
        assert!(matches!(err, PodrunError::Config { .. }));

        let listing = engine.list().expect("list");
        assert_eq!(listing.pods.len(), 1);
        assert_eq!(listing.pods[0].phase, Phase::PrepareFailed);
    }

    #[test]
    fn run_prepared_on_unknown_pod_is_not_found() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(tmp.path()).expect("engine");
        assert!(matches!(
            engine.run_prepared(PodId::generate()),
            Err(PodrunError::NotFound { .. })
        ));
    }

    #[test]
    fn info_of_unknown_pod_is_not_found() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let engine = Engine::new(tmp.path()).expect("engine");
        assert!(engine.info(&PodId::generate()).is_err());
    }
}
