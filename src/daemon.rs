//! Process scaffolding: daemonization, single-instancing, signal flags.
//!
//! Signal handlers are strictly minimal — each sets one atomic flag and
//! returns.  The main loop examines the flags at one known point per tick,
//! so every state transition stays serialized on the control thread.

use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, dup2, fork, getpid, getppid, setsid, ForkResult, Pid};

use crate::error::exit;

/// Default PID file.
pub const PID_FILE: &str = "/run/hpmd.pid";
/// Working directory for the daemonized process.
pub const RUNNING_DIR: &str = "/tmp";

static NEED_RELOAD: AtomicBool = AtomicBool::new(false);
static SHOULD_TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn on_reload(_sig: libc::c_int) {
    NEED_RELOAD.store(true, Ordering::Relaxed);
}

extern "C" fn on_terminate(_sig: libc::c_int) {
    SHOULD_TERMINATE.store(true, Ordering::Relaxed);
}

/// Consume a pending reload request.
pub fn take_reload_request() -> bool {
    NEED_RELOAD.swap(false, Ordering::Relaxed)
}

pub fn termination_requested() -> bool {
    SHOULD_TERMINATE.load(Ordering::Relaxed)
}

/// Install the handlers: reload on SIGUSR1, terminate on SIGTERM (and
/// SIGINT, for foreground runs).  Job-control and child signals are
/// ignored outright.
pub fn install_signal_handlers() -> nix::Result<()> {
    unsafe {
        signal(Signal::SIGUSR1, SigHandler::Handler(on_reload))?;
        signal(Signal::SIGTERM, SigHandler::Handler(on_terminate))?;
        signal(Signal::SIGINT, SigHandler::Handler(on_terminate))?;
        signal(Signal::SIGUSR2, SigHandler::SigIgn)?;
        signal(Signal::SIGHUP, SigHandler::SigIgn)?;
        signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
        signal(Signal::SIGTSTP, SigHandler::SigIgn)?;
        signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
        signal(Signal::SIGTTIN, SigHandler::SigIgn)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-instancing
// ---------------------------------------------------------------------------

/// Held for the whole process lifetime; dropping it releases the instance
/// lock.
#[derive(Debug)]
pub struct PidLock {
    _lock: Flock<File>,
}

#[derive(Debug)]
pub enum LockError {
    /// The PID file could not be opened or written.
    Open(std::io::Error),
    /// Another instance holds the lock.
    Busy,
}

/// Take the advisory lock on the PID file and record our PID in it.
pub fn try_lock(pidfile: &Path) -> Result<PidLock, LockError> {
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(pidfile)
        .map_err(LockError::Open)?;
    let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(l) => l,
        Err((_, _)) => return Err(LockError::Busy),
    };
    lock.set_len(0).map_err(LockError::Open)?;
    writeln!(&mut *lock, "{}", getpid()).map_err(LockError::Open)?;
    Ok(PidLock { _lock: lock })
}

/// Lock or terminate: open failure exits with the lock code, a second
/// instance exits quietly (the running one wins).
pub fn lock_or_exit(pidfile: &Path) -> PidLock {
    match try_lock(pidfile) {
        Ok(lock) => lock,
        Err(LockError::Open(e)) => {
            eprintln!("hpmd: cannot open {}: {e}", pidfile.display());
            process::exit(exit::LOCK);
        }
        Err(LockError::Busy) => process::exit(exit::OK),
    }
}

// ---------------------------------------------------------------------------
// Daemonization
// ---------------------------------------------------------------------------

/// Fork into the background, detach from the tty, and take the instance
/// lock.  A process whose parent is already init skips the fork.
pub fn daemonize(pidfile: &Path, running_dir: &Path) -> PidLock {
    if getppid() != Pid::from_raw(1) {
        match unsafe { fork() } {
            Err(e) => {
                eprintln!("hpmd: fork error: {e}");
                process::exit(exit::FORK);
            }
            Ok(ForkResult::Parent { .. }) => process::exit(exit::OK),
            Ok(ForkResult::Child) => {}
        }
        let _ = setsid();
        redirect_stdio();
    }
    umask(Mode::from_bits_truncate(0o022));
    let _ = chdir(running_dir);
    lock_or_exit(pidfile)
}

fn redirect_stdio() {
    if let Ok(devnull) = File::options().read(true).write(true).open("/dev/null") {
        for fd in 0..=2 {
            let _ = dup2(devnull.as_raw_fd(), fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_flag_is_consumed_once() {
        on_reload(0);
        assert!(take_reload_request());
        assert!(!take_reload_request());
    }

    #[test]
    fn terminate_flag_latches() {
        on_terminate(0);
        assert!(termination_requested());
        assert!(termination_requested(), "terminate is not consumed");
    }

    #[test]
    fn pid_lock_excludes_a_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpmd.pid");
        let lock = try_lock(&path).unwrap();
        match try_lock(&path) {
            Err(LockError::Busy) => {}
            other => panic!("expected Busy, got {other:?}"),
        }
        drop(lock);
        assert!(try_lock(&path).is_ok());
    }

    #[test]
    fn pid_file_contains_our_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpmd.pid");
        let _lock = try_lock(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), getpid().to_string());
    }
}
