//! The pod lifecycle state machine.
//!
//! Every transition is one atomic rename of the pod directory, performed
//! while holding the lock its phase requires. The lock is always taken
//! before the rename, so a pod never appears in a lock-sensitive location
//! without its owner already holding it.
//!
//! ```text
//! embryo ──► prepare ──► prepared ──► run
//!               │  └───────────────────▲
//!               ▼ (lock dropped)
//!          prepare-failed
//! ```
//!
//! Exit has no transition: the kernel drops the run lock when the pod
//! process dies.

use std::path::{Path, PathBuf};

use podrun_common::error::{PodrunError, Result};
use podrun_common::types::{Location, PodId};
use podrun_core::fs::{RenameOutcome, rename_dir};
use podrun_core::lock::{Acquire, Blocking, DirLock, LockMode};

use crate::layout::PodDirs;

/// Outcome of a transition that may race with an identical one.
#[must_use]
#[derive(Debug)]
pub enum Transition<T> {
    /// This caller performed the transition.
    Done(T),
    /// Another actor got there first; nothing was changed.
    RaceLost,
}

impl<T> Transition<T> {
    /// Returns the value if the transition was performed.
    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::RaceLost => None,
        }
    }

    /// Whether another actor won.
    pub const fn is_race_lost(&self) -> bool {
        matches!(self, Self::RaceLost)
    }
}

/// A freshly created pod in `embryo/`.
#[derive(Debug)]
pub struct EmbryoRef {
    id: PodId,
    path: PathBuf,
}

impl EmbryoRef {
    /// Pod identifier.
    #[must_use]
    pub const fn id(&self) -> &PodId {
        &self.id
    }

    /// Current pod directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A pod in `prepare/`, locked exclusively by this process.
#[derive(Debug)]
pub struct PrepareRef {
    id: PodId,
    path: PathBuf,
    lock: DirLock,
}

impl PrepareRef {
    /// Pod identifier.
    #[must_use]
    pub const fn id(&self) -> &PodId {
        &self.id
    }

    /// Current pod directory; preparation writes its metadata here.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A pod in `prepared/`. Holds no lock.
#[derive(Debug, Clone)]
pub struct PreparedRef {
    id: PodId,
    path: PathBuf,
}

impl PreparedRef {
    /// Pod identifier.
    #[must_use]
    pub const fn id(&self) -> &PodId {
        &self.id
    }

    /// Pod directory at the time the reference was made.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A pod in `run/`, locked exclusively by this process.
///
/// The pod stays Running for as long as this lock, or a descriptor
/// inherited from it, stays open.
#[derive(Debug)]
pub struct RunRef {
    id: PodId,
    path: PathBuf,
    lock: DirLock,
}

impl RunRef {
    /// Pod identifier.
    #[must_use]
    pub const fn id(&self) -> &PodId {
        &self.id
    }

    /// Current pod directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The held run lock.
    #[must_use]
    pub const fn lock(&self) -> &DirLock {
        &self.lock
    }

    /// Gives up the reference, keeping only the lock.
    #[must_use]
    pub fn into_lock(self) -> DirLock {
        self.lock
    }
}

/// Drives pods through the directory set.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    dirs: PodDirs,
}

impl Lifecycle {
    /// Creates a state machine over an initialized directory set.
    #[must_use]
    pub const fn new(dirs: PodDirs) -> Self {
        Self { dirs }
    }

    /// The directory set this state machine operates on.
    #[must_use]
    pub const fn dirs(&self) -> &PodDirs {
        &self.dirs
    }

    /// Creates `embryo/<id>`.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::AlreadyExists`] if the embryo directory is
    /// already there, or an I/O error.
    pub fn create_embryo(&self, id: PodId) -> Result<EmbryoRef> {
        let path = self.dirs.pod_path(Location::Embryo, &id);
        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PodrunError::AlreadyExists { id: id.to_string() });
            }
            Err(e) => return Err(PodrunError::io(&path, e)),
        }
        tracing::info!(id = %id, "pod embryo created");
        Ok(EmbryoRef { id, path })
    }

    /// Locks the embryo and moves it to `prepare/`.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::NotFound`] if the embryo is gone and
    /// [`PodrunError::CorruptState`] if it vanishes while locked.
    pub fn enter_prepare(&self, embryo: EmbryoRef) -> Result<PrepareRef> {
        let EmbryoRef { id, path } = embryo;
        let lock = match DirLock::acquire(&path, LockMode::Exclusive, Blocking::Wait)? {
            Acquire::Locked(lock) => lock,
            Acquire::Missing => {
                return Err(PodrunError::NotFound {
                    kind: "embryo",
                    id: id.to_string(),
                });
            }
            Acquire::Busy => return Err(PodrunError::corrupt(&path, "embryo lock busy")),
        };

        let to = self.dirs.pod_path(Location::Prepare, &id);
        self.owned_rename(&path, &to)?;
        tracing::info!(id = %id, "pod preparing");
        Ok(PrepareRef { id, path: to, lock })
    }

    /// Moves a prepared pod to `prepared/` and releases its lock.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::CorruptState`] if the pod vanished while
    /// locked, or an I/O error.
    pub fn prepare_succeeded_to_prepared(&self, prepare: PrepareRef) -> Result<PreparedRef> {
        let PrepareRef { id, path, lock } = prepare;
        let to = self.dirs.pod_path(Location::Prepared, &id);
        self.owned_rename(&path, &to)?;
        lock.release();
        tracing::info!(id = %id, "pod prepared");
        Ok(PreparedRef { id, path: to })
    }

    /// Moves a prepared pod straight to `run/`, keeping the lock.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::CorruptState`] if the pod vanished while
    /// locked, or an I/O error.
    pub fn prepare_succeeded_to_run(&self, prepare: PrepareRef) -> Result<RunRef> {
        let PrepareRef { id, path, lock } = prepare;
        let to = self.dirs.pod_path(Location::Run, &id);
        self.owned_rename(&path, &to)?;
        tracing::info!(id = %id, "pod running");
        Ok(RunRef { id, path: to, lock })
    }

    /// Abandons preparation.
    ///
    /// The pod stays in `prepare/` unlocked, which is how the collector
    /// recognizes a failed preparation.
    pub fn prepare_failed(&self, prepare: PrepareRef) {
        let PrepareRef { id, lock, .. } = prepare;
        lock.release();
        tracing::info!(id = %id, "pod preparation failed");
    }

    /// Looks up a pod that is currently prepared.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::NotFound`] if the pod does not exist and
    /// [`PodrunError::InvalidPhase`] if it is in any other phase.
    pub fn open_prepared(&self, id: PodId) -> Result<PreparedRef> {
        if self.dirs.contains(Location::Prepared, &id)? {
            return Ok(PreparedRef {
                id,
                path: self.dirs.pod_path(Location::Prepared, &id),
            });
        }
        match crate::pulse::probe_phase(&self.dirs, &id)? {
            Some(phase) => Err(PodrunError::InvalidPhase {
                id: id.to_string(),
                phase: phase.to_string(),
                expected: "prepared",
            }),
            None => Err(PodrunError::NotFound {
                kind: "pod",
                id: id.to_string(),
            }),
        }
    }

    /// Locks a prepared pod and moves it to `run/`.
    ///
    /// The lock is attempted without blocking. If it is busy, or the pod
    /// has already left `prepared/`, another caller is starting or
    /// collecting the same pod and [`Transition::RaceLost`] is returned
    /// without touching anything.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures or corrupt state.
    pub fn resume_from_prepared(&self, prepared: PreparedRef) -> Result<Transition<RunRef>> {
        let PreparedRef { id, .. } = prepared;
        let from = self.dirs.pod_path(Location::Prepared, &id);

        let lock = match DirLock::acquire(&from, LockMode::Exclusive, Blocking::NoWait)? {
            Acquire::Locked(lock) => lock,
            Acquire::Busy | Acquire::Missing => {
                tracing::debug!(id = %id, "lost race to resume prepared pod");
                return Ok(Transition::RaceLost);
            }
        };

        let to = self.dirs.pod_path(Location::Run, &id);
        match rename_dir(&from, &to)? {
            RenameOutcome::Moved => {
                tracing::info!(id = %id, "prepared pod running");
                Ok(Transition::Done(RunRef { id, path: to, lock }))
            }
            RenameOutcome::SourceMissing => {
                tracing::debug!(id = %id, "prepared pod moved before rename");
                Ok(Transition::RaceLost)
            }
        }
    }

    /// Renames a directory only this process may move.
    fn owned_rename(&self, from: &Path, to: &Path) -> Result<()> {
        match rename_dir(from, to)? {
            RenameOutcome::Moved => Ok(()),
            RenameOutcome::SourceMissing => {
                Err(PodrunError::corrupt(from, "pod vanished while locked"))
            }
        }
    }
}
