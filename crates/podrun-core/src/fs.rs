//! Filesystem helpers for moving and removing pod directories.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::fcntl::{AT_FDCWD, RenameFlags, renameat2};
use podrun_common::error::{PodrunError, Result};

/// Outcome of an atomic directory rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The directory now lives at the destination.
    Moved,
    /// The source no longer existed; someone else moved or removed it.
    SourceMissing,
}

/// Atomically renames the directory `from` to `to`.
///
/// The destination is never replaced, not even when it is an empty
/// directory.
///
/// # Errors
///
/// Returns [`PodrunError::CorruptState`] if the destination already exists
/// and [`PodrunError::Io`] for any other failure.
pub fn rename_dir(from: &Path, to: &Path) -> Result<RenameOutcome> {
    match renameat2(AT_FDCWD, from, AT_FDCWD, to, RenameFlags::RENAME_NOREPLACE) {
        Ok(()) => Ok(RenameOutcome::Moved),
        Err(Errno::ENOENT) => {
            // ENOENT also covers a missing destination parent.
            if std::fs::symlink_metadata(from).is_err() {
                Ok(RenameOutcome::SourceMissing)
            } else {
                Err(PodrunError::io(to, Errno::ENOENT.into()))
            }
        }
        Err(Errno::EEXIST | Errno::ENOTEMPTY) => Err(PodrunError::corrupt(
            to,
            format!("destination exists while moving {}", from.display()),
        )),
        Err(errno) => Err(PodrunError::io(from, errno.into())),
    }
}

/// Returns the change-time of `path`, or `None` if it does not exist.
///
/// # Errors
///
/// Returns an error if the metadata cannot be read.
pub fn change_time(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PodrunError::io(path, e)),
    };
    let nanos = u32::try_from(meta.ctime_nsec()).unwrap_or(0);
    Ok(DateTime::from_timestamp(meta.ctime(), nanos))
}

/// Recursively removes the directory tree at `path`.
///
/// Returns `false` if it was already gone.
///
/// # Errors
///
/// Returns an error if any part of the tree cannot be removed.
pub fn remove_tree(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PodrunError::io(path, e)),
    }
}
