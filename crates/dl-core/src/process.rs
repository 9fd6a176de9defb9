//! Process and artifact utilities for tunnel teardown
//!
//! Helpers for signalling forwarding processes and removing stale socket
//! files. All of them tolerate the target already being gone.

use std::fs;
use std::io;
use std::path::Path;

/// Remove a file, treating "already gone" as success
///
/// Returns `Ok(true)` if a file was removed, `Ok(false)` if none existed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Reject pids that `kill(2)` would interpret as process groups
#[cfg(unix)]
fn as_single_pid(pid: u32) -> io::Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {}", pid),
        )),
    }
}

/// Send SIGTERM to a process
///
/// A process that no longer exists counts as terminated.
#[cfg(unix)]
pub fn terminate_process(pid: u32) -> io::Result<()> {
    let pid = as_single_pid(pid)?;
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
pub fn terminate_process(pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot signal pid {} on this platform", pid),
    ))
}
