//! Domain primitive types used across the podrun workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PodrunError, Result};

/// Unique identifier for a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodId(uuid::Uuid);

impl PodId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn new(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a random pod ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parses a pod ID from its textual UUID form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PodrunError::Config {
                message: format!("invalid pod UUID {s:?}: {e}"),
            })
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PodId {
    type Err = PodrunError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Top-level pod directory a pod currently lives in.
///
/// Ordered along the forward direction of the lifecycle: a pod only ever
/// moves to a later location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    /// `embryo/`: created, not yet claimed by a preparer.
    Embryo,
    /// `prepare/`: being prepared, or preparation failed.
    Prepare,
    /// `prepared/`: ready to be run.
    Prepared,
    /// `run/`: running or exited.
    Run,
    /// `exited-garbage/`: exited and marked for collection.
    ExitedGarbage,
    /// `garbage/`: failed or expired preparation marked for collection.
    Garbage,
}

impl Location {
    /// Every location, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Embryo,
        Self::Prepare,
        Self::Prepared,
        Self::Run,
        Self::ExitedGarbage,
        Self::Garbage,
    ];

    /// Directory name under the pods root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Embryo => "embryo",
            Self::Prepare => "prepare",
            Self::Prepared => "prepared",
            Self::Run => "run",
            Self::ExitedGarbage => "exited-garbage",
            Self::Garbage => "garbage",
        }
    }

    /// Whether the phase at this location depends on the lock state.
    #[must_use]
    pub const fn is_lock_sensitive(self) -> bool {
        !matches!(self, Self::Embryo | Self::Prepared)
    }

    /// Locations strictly after this one.
    #[must_use]
    pub fn successors(self) -> &'static [Self] {
        let all: &'static [Self] = &Self::ALL;
        let idx = all.iter().position(|l| *l == self).unwrap_or(0);
        &all[idx + 1..]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Lock state sampled on a pod directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Another descriptor holds the directory exclusively.
    Held,
    /// A shared lock could be taken.
    Free,
}

/// Derived lifecycle phase of a pod.
///
/// Never stored: always computed from where the pod lives and whether its
/// directory is locked, see [`Phase::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Directory created, preparation not started.
    Embryo,
    /// Preparation in progress.
    Preparing,
    /// Preparer went away without finishing.
    PrepareFailed,
    /// Ready to run.
    Prepared,
    /// Pod process alive.
    Running,
    /// Pod process gone, not yet marked.
    Exited,
    /// Exited pod being deleted.
    ExitedDeleting,
    /// Exited pod marked for collection.
    ExitedGarbage,
    /// Failed preparation being deleted.
    GarbageDeleting,
    /// Failed preparation marked for collection.
    Garbage,
}

impl Phase {
    /// Derives the phase from a location and, for lock-sensitive
    /// locations, the sampled lock state.
    ///
    /// `lock` is ignored for [`Location::Embryo`] and
    /// [`Location::Prepared`].
    #[must_use]
    pub const fn derive(location: Location, lock: LockState) -> Self {
        match (location, lock) {
            (Location::Embryo, _) => Self::Embryo,
            (Location::Prepare, LockState::Held) => Self::Preparing,
            (Location::Prepare, LockState::Free) => Self::PrepareFailed,
            (Location::Prepared, _) => Self::Prepared,
            (Location::Run, LockState::Held) => Self::Running,
            (Location::Run, LockState::Free) => Self::Exited,
            (Location::ExitedGarbage, LockState::Held) => Self::ExitedDeleting,
            (Location::ExitedGarbage, LockState::Free) => Self::ExitedGarbage,
            (Location::Garbage, LockState::Held) => Self::GarbageDeleting,
            (Location::Garbage, LockState::Free) => Self::Garbage,
        }
    }

    /// Projects the phase onto the coarser status reported to callers.
    #[must_use]
    pub const fn status(self) -> PodStatus {
        match self {
            Self::Embryo | Self::Preparing => PodStatus::Preparing,
            Self::PrepareFailed | Self::Garbage => PodStatus::PrepareFailed,
            Self::Prepared => PodStatus::Prepared,
            Self::Running => PodStatus::Running,
            Self::Exited | Self::ExitedGarbage => PodStatus::Exited,
            Self::ExitedDeleting | Self::GarbageDeleting => PodStatus::Deleting,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Embryo => "embryo",
            Self::Preparing => "preparing",
            Self::PrepareFailed => "prepare-failed",
            Self::Prepared => "prepared",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::ExitedDeleting => "exited-deleting",
            Self::ExitedGarbage => "exited-garbage",
            Self::GarbageDeleting => "garbage-deleting",
            Self::Garbage => "garbage",
        };
        f.write_str(s)
    }
}

/// Point-in-time status of a pod as reported by the pulse query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodStatus {
    /// No directory for the pod exists.
    NotFound,
    /// Being created or prepared.
    Preparing,
    /// Preparation did not complete.
    PrepareFailed,
    /// Ready to run.
    Prepared,
    /// Pod process alive.
    Running,
    /// Pod process gone.
    Exited,
    /// Being removed by the collector.
    Deleting,
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not-found",
            Self::Preparing => "preparing",
            Self::PrepareFailed => "prepare-failed",
            Self::Prepared => "prepared",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_id_parses_its_own_display() {
        let id = PodId::generate();
        let parsed: PodId = id.to_string().parse().expect("should parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn pod_id_rejects_garbage() {
        assert!(PodId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn run_location_disambiguates_on_lock() {
        assert_eq!(Phase::derive(Location::Run, LockState::Held), Phase::Running);
        assert_eq!(Phase::derive(Location::Run, LockState::Free), Phase::Exited);
    }

    #[test]
    fn prepare_location_unlocked_is_failure() {
        assert_eq!(
            Phase::derive(Location::Prepare, LockState::Free),
            Phase::PrepareFailed
        );
    }

    #[test]
    fn lock_is_ignored_where_not_applicable() {
        for lock in [LockState::Held, LockState::Free] {
            assert_eq!(Phase::derive(Location::Embryo, lock), Phase::Embryo);
            assert_eq!(Phase::derive(Location::Prepared, lock), Phase::Prepared);
        }
    }

    #[test]
    fn deleting_phases_project_to_deleting() {
        assert_eq!(Phase::ExitedDeleting.status(), PodStatus::Deleting);
        assert_eq!(Phase::GarbageDeleting.status(), PodStatus::Deleting);
        assert_eq!(Phase::ExitedGarbage.status(), PodStatus::Exited);
        assert_eq!(Phase::Garbage.status(), PodStatus::PrepareFailed);
    }

    #[test]
    fn successors_follow_lifecycle_order() {
        assert_eq!(
            Location::Run.successors(),
            &[Location::ExitedGarbage, Location::Garbage]
        );
        assert!(Location::Garbage.successors().is_empty());
    }

    #[test]
    fn location_dir_names() {
        assert_eq!(Location::ExitedGarbage.to_string(), "exited-garbage");
        assert!(!Location::Prepared.is_lock_sensitive());
        assert!(Location::Run.is_lock_sensitive());
    }
}
