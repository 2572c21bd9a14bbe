//! Detach from the terminal with stdout and stderr going to a log file.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Point stdout and stderr at `log_path` (appending), then fork. The parent
/// exits with status 0; the child returns as leader of a new session.
///
/// Must run before any thread is spawned, including the tokio runtime.
pub fn daemonize(log_path: &Path) -> io::Result<()> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(log_path)?;
    let fd = log.as_raw_fd();

    // SAFETY: `fd` is open for the duration of both calls
    unsafe {
        if libc::dup2(fd, libc::STDOUT_FILENO) == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::dup2(fd, libc::STDERR_FILENO) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    drop(log);

    // SAFETY: the process is still single-threaded
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => {
            // SAFETY: plain syscall without arguments
            if unsafe { libc::setsid() } == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}
