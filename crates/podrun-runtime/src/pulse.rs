//! Point-in-time phase sampling.
//!
//! Every answer is re-derived from the directory set and a non-blocking
//! shared lock probe; nothing is cached between calls. An answer is only
//! known to have been true at the instant it was sampled.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use podrun_common::error::Result;
use podrun_common::types::{Location, LockState, Phase, PodId, PodStatus};
use podrun_core::lock::{Acquire, Blocking, DirLock, LockMode};

use crate::layout::{CorruptEntry, PodDirs};

/// One pod as seen by [`list_pods`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    /// Pod identifier.
    pub id: PodId,
    /// Phase at the time it was sampled.
    pub phase: Phase,
    /// Change-time of the pod directory, if it could still be read.
    pub changed_at: Option<DateTime<Utc>>,
}

/// Every pod in the directory set.
#[derive(Debug, Default)]
pub struct Listing {
    /// Pods in lifecycle order of their location, then by ID.
    pub pods: Vec<PodSummary>,
    /// Entries that are not well-formed pods.
    pub corrupt: Vec<CorruptEntry>,
}

/// Samples the lock on a pod directory known to be in `location`.
///
/// Returns `None` if the directory moved away before it could be probed.
fn sample(path: &Path, location: Location) -> Result<Option<Phase>> {
    if !location.is_lock_sensitive() {
        return Ok(Some(Phase::derive(location, LockState::Free)));
    }
    let lock = match DirLock::acquire(path, LockMode::Shared, Blocking::NoWait)? {
        Acquire::Locked(probe) => {
            probe.release();
            LockState::Free
        }
        Acquire::Busy => LockState::Held,
        Acquire::Missing => return Ok(None),
    };
    Ok(Some(Phase::derive(location, lock)))
}

/// Searches `locations` in order for the pod and samples its phase.
fn probe_in(dirs: &PodDirs, id: &PodId, locations: &[Location]) -> Result<Option<Phase>> {
    for &location in locations {
        if !dirs.contains(location, id)? {
            continue;
        }
        if let Some(phase) = sample(&dirs.pod_path(location, id), location)? {
            return Ok(Some(phase));
        }
        // Moved on between the existence check and the probe. Pods only
        // move forward, so the remaining locations still cover it.
        tracing::trace!(id = %id, %location, "pod moved while probing");
    }
    Ok(None)
}

/// Derives the full phase of a pod, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`podrun_common::error::PodrunError::CorruptState`] if the
/// pod's name is taken by something that is not a directory, or an I/O
/// error.
pub fn probe_phase(dirs: &PodDirs, id: &PodId) -> Result<Option<Phase>> {
    probe_in(dirs, id, &Location::ALL)
}

/// Reports a pod's status at the instant of the call.
///
/// Never holds a lock past its own return.
///
/// # Errors
///
/// See [`probe_phase`].
pub fn query_status(dirs: &PodDirs, id: &PodId) -> Result<PodStatus> {
    let status = probe_phase(dirs, id)?.map_or(PodStatus::NotFound, Phase::status);
    tracing::debug!(id = %id, %status, "pod status sampled");
    Ok(status)
}

/// Samples every pod in every location.
///
/// A pod that moves forward during the listing is reported once, at the
/// first place it was successfully sampled.
///
/// # Errors
///
/// Returns an error if a location cannot be read.
pub fn list_pods(dirs: &PodDirs) -> Result<Listing> {
    let mut listing = Listing::default();
    let mut seen = HashSet::new();

    for location in Location::ALL {
        let scan = dirs.scan(location)?;
        listing.corrupt.extend(scan.corrupt);

        for id in scan.pods {
            if seen.contains(&id) {
                continue;
            }
            let path = dirs.pod_path(location, &id);
            let phase = match sample(&path, location)? {
                Some(phase) => Some(phase),
                None => probe_in(dirs, &id, location.successors())?,
            };
            let Some(phase) = phase else {
                continue;
            };
            let _ = seen.insert(id);
            let changed_at = current_change_time(dirs, &id)?;
            listing.pods.push(PodSummary {
                id,
                phase,
                changed_at,
            });
        }
    }
    Ok(listing)
}

fn current_change_time(dirs: &PodDirs, id: &PodId) -> Result<Option<DateTime<Utc>>> {
    for location in Location::ALL {
        if let Some(ctime) = podrun_core::fs::change_time(&dirs.pod_path(location, id))? {
            return Ok(Some(ctime));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PodDirs) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dirs = PodDirs::new(tmp.path());
        dirs.init().expect("init");
        (tmp, dirs)
    }

    fn place(dirs: &PodDirs, location: Location) -> PodId {
        let id = PodId::generate();
        std::fs::create_dir(dirs.pod_path(location, &id)).expect("mkdir");
        id
    }

    fn hold(dirs: &PodDirs, location: Location, id: &PodId) -> DirLock {
        DirLock::acquire(&dirs.pod_path(location, id), LockMode::Exclusive, Blocking::NoWait)
            .expect("acquire")
            .locked()
            .expect("locked")
    }

    #[test]
    fn unknown_pod_is_not_found() {
        let (_tmp, dirs) = setup();
        let status = query_status(&dirs, &PodId::generate()).expect("query");
        assert_eq!(status, PodStatus::NotFound);
    }

    #[test]
    fn run_dir_locked_is_running_unlocked_is_exited() {
        let (_tmp, dirs) = setup();
        let id = place(&dirs, Location::Run);

        let held = hold(&dirs, Location::Run, &id);
        assert_eq!(query_status(&dirs, &id).expect("query"), PodStatus::Running);
        held.release();
        assert_eq!(query_status(&dirs, &id).expect("query"), PodStatus::Exited);
    }

    #[test]
    fn probe_releases_its_shared_lock() {
        let (_tmp, dirs) = setup();
        let id = place(&dirs, Location::Run);

        assert_eq!(probe_phase(&dirs, &id).expect("probe"), Some(Phase::Exited));
        // An exclusive lock is only possible if the probe let go.
        let _held = hold(&dirs, Location::Run, &id);
    }

    #[test]
    fn prepare_dir_distinguishes_failure() {
        let (_tmp, dirs) = setup();
        let id = place(&dirs, Location::Prepare);
        assert_eq!(query_status(&dirs, &id).expect("query"), PodStatus::PrepareFailed);

        let _held = hold(&dirs, Location::Prepare, &id);
        assert_eq!(probe_phase(&dirs, &id).expect("probe"), Some(Phase::Preparing));
    }

    #[test]
    fn garbage_locations_map_to_deleting_when_held() {
        let (_tmp, dirs) = setup();
        let exited = place(&dirs, Location::ExitedGarbage);
        let failed = place(&dirs, Location::Garbage);

        assert_eq!(query_status(&dirs, &exited).expect("query"), PodStatus::Exited);
        assert_eq!(query_status(&dirs, &failed).expect("query"), PodStatus::PrepareFailed);

        let _a = hold(&dirs, Location::ExitedGarbage, &exited);
        let _b = hold(&dirs, Location::Garbage, &failed);
        assert_eq!(query_status(&dirs, &exited).expect("query"), PodStatus::Deleting);
        assert_eq!(query_status(&dirs, &failed).expect("query"), PodStatus::Deleting);
    }

    #[test]
    fn embryo_reports_as_preparing() {
        let (_tmp, dirs) = setup();
        let id = place(&dirs, Location::Embryo);
        assert_eq!(probe_phase(&dirs, &id).expect("probe"), Some(Phase::Embryo));
        assert_eq!(query_status(&dirs, &id).expect("query"), PodStatus::Preparing);
    }

    #[test]
    fn list_reports_every_pod_once() {
        let (_tmp, dirs) = setup();
        let prepared = place(&dirs, Location::Prepared);
        let exited = place(&dirs, Location::Run);
        let _ = std::fs::write(dirs.location_dir(Location::Run).join("stray"), b"");

        let listing = list_pods(&dirs).expect("list");
        let phases: Vec<_> = listing.pods.iter().map(|p| (p.id, p.phase)).collect();
        assert_eq!(phases, vec![(prepared, Phase::Prepared), (exited, Phase::Exited)]);
        assert!(listing.pods.iter().all(|p| p.changed_at.is_some()));
        assert_eq!(listing.corrupt.len(), 1);
    }
}
