//! Advisory locks on pod directories.
//!
//! A lock is a `flock(2)` lock on a descriptor opened on the directory
//! itself. It follows the inode across renames and disappears when the last
//! descriptor sharing the open file description is closed, including when
//! the owning process dies. Nothing here records why a directory is locked;
//! the meaning comes from where the directory lives.

use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use podrun_common::error::{PodrunError, Result};

/// Lock compatibility mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Only one holder; conflicts with every other lock.
    Exclusive,
    /// Any number of shared holders; conflicts with an exclusive holder.
    Shared,
}

/// Whether acquisition may suspend the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    /// Wait until the lock becomes available.
    Wait,
    /// Return [`Acquire::Busy`] immediately if the lock is held.
    NoWait,
}

/// Outcome of a lock attempt.
#[derive(Debug)]
pub enum Acquire {
    /// The lock is held until the returned handle is dropped.
    Locked(DirLock),
    /// Held incompatibly by someone else (non-blocking mode only).
    Busy,
    /// The directory does not exist (any more).
    Missing,
}

impl Acquire {
    /// Returns the lock if one was acquired.
    #[must_use]
    pub fn locked(self) -> Option<DirLock> {
        match self {
            Self::Locked(lock) => Some(lock),
            Self::Busy | Self::Missing => None,
        }
    }
}

/// A held advisory lock on a directory.
///
/// Dropping the handle closes its descriptor. No explicit unlock is ever
/// issued, so a child that inherited the descriptor keeps the lock alive
/// after the parent lets go.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl DirLock {
    /// Opens `path` and locks it.
    ///
    /// Interrupted waits are retried.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::CorruptState`] if `path` is not a directory
    /// and [`PodrunError::Io`] for any other failure to open or lock.
    pub fn acquire(path: &Path, mode: LockMode, blocking: Blocking) -> Result<Acquire> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Acquire::Missing),
            Err(e) => return Err(PodrunError::io(path, e)),
        };
        let meta = file.metadata().map_err(|e| PodrunError::io(path, e))?;
        if !meta.is_dir() {
            return Err(PodrunError::corrupt(path, "expected a pod directory"));
        }

        let mut op = match mode {
            LockMode::Exclusive => libc::LOCK_EX,
            LockMode::Shared => libc::LOCK_SH,
        };
        if blocking == Blocking::NoWait {
            op |= libc::LOCK_NB;
        }

        loop {
            match flock(file.as_raw_fd(), op) {
                Ok(()) => break,
                Err(Errno::EINTR) => {}
                Err(Errno::EWOULDBLOCK) => {
                    tracing::trace!(path = %path.display(), ?mode, "lock busy");
                    return Ok(Acquire::Busy);
                }
                Err(errno) => return Err(PodrunError::io(path, errno.into())),
            }
        }

        tracing::trace!(path = %path.display(), ?mode, "lock acquired");
        Ok(Acquire::Locked(Self {
            file,
            path: path.to_path_buf(),
            mode,
        }))
    }

    /// Path the lock was taken on. The directory may have moved since.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the lock is held in.
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the lock by closing the descriptor.
    pub fn release(self) {
        tracing::trace!(path = %self.path.display(), "lock released");
        drop(self);
    }
}

impl AsFd for DirLock {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DirLock {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn flock(fd: RawFd, op: libc::c_int) -> nix::Result<()> {
    // SAFETY: `fd` belongs to a `File` that outlives this call; flock(2)
    // only touches the lock table.
    Errno::result(unsafe { libc::flock(fd, op) }).map(drop)
}
