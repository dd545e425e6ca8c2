//! Mark-and-sweep collection of exited pods and failed preparations.
//!
//! Marking renames a pod whose lock is free into a garbage directory;
//! the rename also stamps the directory change-time that starts its grace
//! period. Sweeping deletes garbage whose grace period is over, holding an
//! exclusive lock while it does so. Any pod that cannot be locked without
//! blocking is skipped until the next run.
//!
//! A collector that dies part-way leaves every pod either where it was or
//! in a garbage directory, and the next run picks up from there.

use std::time::Duration;

use chrono::{DateTime, Utc};
use podrun_common::config::GcConfig;
use podrun_common::error::{PodrunError, Result};
use podrun_common::types::{Location, PodId};
use podrun_core::fs::{RenameOutcome, change_time, remove_tree, rename_dir};
use podrun_core::lock::{Acquire, Blocking, DirLock, LockMode};

use crate::layout::{CorruptEntry, PodDirs};

/// Collection windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPolicy {
    /// Minimum time a marked pod stays before it may be deleted.
    pub grace_period: Duration,
    /// Age after which an unused prepared pod becomes garbage.
    pub prepared_expiration: Duration,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self::from(&GcConfig::default())
    }
}

impl From<&GcConfig> for GcPolicy {
    fn from(config: &GcConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            prepared_expiration: config.prepared_expiration(),
        }
    }
}

/// What a collection did.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Exited pods moved from `run/` to `exited-garbage/`.
    pub marked_exited: Vec<PodId>,
    /// Failed preparations moved from `prepare/` to `garbage/`.
    pub marked_failed: Vec<PodId>,
    /// Stale prepared pods moved from `prepared/` to `garbage/`.
    pub expired_prepared: Vec<PodId>,
    /// Pods deleted.
    pub swept: Vec<PodId>,
    /// Pods skipped because their lock was held.
    pub skipped_busy: usize,
    /// Garbage skipped because it is still within its grace period.
    pub skipped_grace: usize,
    /// Entries that violate the directory layout. Left untouched.
    pub corrupt: Vec<CorruptEntry>,
}

/// Runs collections over a directory set.
#[derive(Debug)]
pub struct Collector<'a> {
    dirs: &'a PodDirs,
    policy: GcPolicy,
}

impl<'a> Collector<'a> {
    /// Creates a collector.
    #[must_use]
    pub const fn new(dirs: &'a PodDirs, policy: GcPolicy) -> Self {
        Self { dirs, policy }
    }

    /// Runs every pass against the current time.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failures unrelated to racing actors.
    pub fn collect(&self) -> Result<GcReport> {
        self.collect_at(Utc::now())
    }

    /// Runs every pass as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failures unrelated to racing actors.
    pub fn collect_at(&self, now: DateTime<Utc>) -> Result<GcReport> {
        let mut report = GcReport::default();

        let marked_exited = self.mark(Location::Run, Location::ExitedGarbage, &mut report)?;
        let marked_failed = self.mark(Location::Prepare, Location::Garbage, &mut report)?;
        let expired_prepared = self.expire_prepared(now, &mut report)?;
        let mut swept = self.sweep(Location::ExitedGarbage, now, &mut report)?;
        swept.extend(self.sweep(Location::Garbage, now, &mut report)?);

        report.marked_exited = marked_exited;
        report.marked_failed = marked_failed;
        report.expired_prepared = expired_prepared;
        report.swept = swept;

        tracing::info!(
            marked_exited = report.marked_exited.len(),
            marked_failed = report.marked_failed.len(),
            expired_prepared = report.expired_prepared.len(),
            swept = report.swept.len(),
            skipped_busy = report.skipped_busy,
            skipped_grace = report.skipped_grace,
            corrupt = report.corrupt.len(),
            "garbage collection finished"
        );
        Ok(report)
    }

    /// Moves every pod in `from` whose lock is free into `to`.
    ///
    /// A shared lock succeeding means nobody holds the pod exclusively:
    /// in `run/` the process has exited, in `prepare/` the preparer is
    /// gone.
    fn mark(&self, from: Location, to: Location, report: &mut GcReport) -> Result<Vec<PodId>> {
        let scan = self.dirs.scan(from)?;
        report.corrupt.extend(scan.corrupt);

        let mut marked = Vec::new();
        for id in scan.pods {
            let src = self.dirs.pod_path(from, &id);
            let probe = match DirLock::acquire(&src, LockMode::Shared, Blocking::NoWait)? {
                Acquire::Locked(probe) => probe,
                Acquire::Busy => {
                    report.skipped_busy += 1;
                    continue;
                }
                Acquire::Missing => continue,
            };
            let dst = self.dirs.pod_path(to, &id);
            if transfer(&id, &src, &dst, report)? {
                tracing::info!(id = %id, %from, %to, "pod marked for collection");
                marked.push(id);
            }
            probe.release();
        }
        Ok(marked)
    }

    /// Moves prepared pods older than the expiration window to `garbage/`.
    fn expire_prepared(&self, now: DateTime<Utc>, report: &mut GcReport) -> Result<Vec<PodId>> {
        let scan = self.dirs.scan(Location::Prepared)?;
        report.corrupt.extend(scan.corrupt);

        let mut expired = Vec::new();
        for id in scan.pods {
            let src = self.dirs.pod_path(Location::Prepared, &id);
            let Some(ctime) = change_time(&src)? else {
                continue;
            };
            if !is_older_than(ctime, now, self.policy.prepared_expiration) {
                continue;
            }
            // Exclusive, so a concurrent resume either wins the lock or
            // finds the pod gone.
            let lock = match DirLock::acquire(&src, LockMode::Exclusive, Blocking::NoWait)? {
                Acquire::Locked(lock) => lock,
                Acquire::Busy => {
                    report.skipped_busy += 1;
                    continue;
                }
                Acquire::Missing => continue,
            };
            let dst = self.dirs.pod_path(Location::Garbage, &id);
            if transfer(&id, &src, &dst, report)? {
                tracing::info!(id = %id, "prepared pod expired");
                expired.push(id);
            }
            lock.release();
        }
        Ok(expired)
    }

    /// Deletes pods in a garbage location whose grace period is over.
    fn sweep(
        &self,
        location: Location,
        now: DateTime<Utc>,
        report: &mut GcReport,
    ) -> Result<Vec<PodId>> {
        let scan = self.dirs.scan(location)?;
        report.corrupt.extend(scan.corrupt);

        let mut swept = Vec::new();
        for id in scan.pods {
            let path = self.dirs.pod_path(location, &id);
            let Some(ctime) = change_time(&path)? else {
                continue;
            };
            if !is_older_than(ctime, now, self.policy.grace_period) {
                report.skipped_grace += 1;
                continue;
            }
            let lock = match DirLock::acquire(&path, LockMode::Exclusive, Blocking::NoWait)? {
                Acquire::Locked(lock) => lock,
                Acquire::Busy => {
                    tracing::debug!(id = %id, %location, "garbage pod busy, retrying later");
                    report.skipped_busy += 1;
                    continue;
                }
                Acquire::Missing => continue,
            };
            if remove_tree(&path)? {
                tracing::info!(id = %id, %location, "pod deleted");
                swept.push(id);
            } else {
                tracing::debug!(id = %id, "pod already deleted by another collector");
            }
            lock.release();
        }
        Ok(swept)
    }
}

/// Renames a pod the caller holds a lock on.
///
/// Returns whether this call moved it. Corrupt destinations are
/// recorded in the report and left alone.
fn transfer(
    id: &PodId,
    src: &std::path::Path,
    dst: &std::path::Path,
    report: &mut GcReport,
) -> Result<bool> {
    match rename_dir(src, dst) {
        Ok(RenameOutcome::Moved) => Ok(true),
        Ok(RenameOutcome::SourceMissing) => {
            tracing::debug!(id = %id, "pod moved by another actor");
            Ok(false)
        }
        Err(PodrunError::CorruptState { path, message }) => {
            tracing::warn!(id = %id, path = %path.display(), %message, "cannot mark pod");
            report.corrupt.push(CorruptEntry {
                path,
                reason: message,
            });
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn is_older_than(ctime: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let age = now.signed_duration_since(ctime);
    chrono::Duration::from_std(window).is_ok_and(|window| age >= window)
}
