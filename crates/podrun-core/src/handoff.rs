//! Passing a held pod lock to the process that executes the pod.
//!
//! The executing process must keep the lock descriptor open for its whole
//! lifetime. The descriptor is made inheritable only in the child, between
//! fork and exec, so unrelated processes spawned by the same parent never
//! pick it up, and its number is published in [`ENV_LOCK_FD`].

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::Command;

use podrun_common::constants::ENV_LOCK_FD;

/// Arranges for `cmd` to inherit the descriptor behind `lock`.
///
/// The caller must keep `lock` open until the command has been spawned or
/// exec'd.
pub fn inherit_lock(cmd: &mut Command, lock: &impl AsRawFd) {
    let fd = lock.as_raw_fd();
    let _ = cmd.env(ENV_LOCK_FD, fd.to_string());
    // SAFETY: the hook only calls fcntl(2), which is async-signal-safe, and
    // does not allocate.
    unsafe {
        let _ = cmd.pre_exec(move || clear_cloexec(fd));
    }
}

fn clear_cloexec(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: `fd` is open in the child until exec; F_SETFD only changes
    // the descriptor flags.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, 0) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
