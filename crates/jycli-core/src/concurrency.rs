use crate::CoreError;
use fs2::FileExt;
use jycli_remote::{CancelToken, Interrupted};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// How often a waiting process re-tries a held coordinate lock.
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Exit status used when a second Ctrl-C arrives during resolution.
pub const INTERRUPTED_EXIT: i32 = 130;

fn open_lock_file(lock_path: &Path) -> Result<File, std::io::Error> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
}

/// Exclusive advisory lock on the whole cache, taken by maintenance commands
/// that delete entries.
pub struct StoreLock {
    lock_file: File,
}

impl StoreLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }

    /// Shared hold taken by launches, so maintenance never deletes files a
    /// running resolution is about to use. Waiting behind a maintenance
    /// command polls, so `cancel` and its deadline still apply.
    pub fn acquire_shared(lock_path: &Path, cancel: &CancelToken) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        loop {
            if file.try_lock_shared().is_ok() {
                return Ok(Self { lock_file: file });
            }
            cancel
                .sleep(LOCK_POLL)
                .map_err(|e| CoreError::Resolve(e.into()))?;
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Per-coordinate lock serialising fetches of one artifact across processes.
///
/// Waiting polls `try_lock` so the wait itself stays cancellable.
pub struct CoordinateLock {
    lock_file: File,
}

impl CoordinateLock {
    pub fn acquire(lock_path: &Path, cancel: &CancelToken) -> Result<Self, CoordinateLockError> {
        let file = open_lock_file(lock_path)?;
        loop {
            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { lock_file: file });
            }
            cancel.sleep(LOCK_POLL)?;
        }
    }
}

impl Drop for CoordinateLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinateLockError {
    #[error("coordinate lock I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("waiting for coordinate lock: {0}")]
    Interrupted(#[from] Interrupted),
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static HOST_RUNNING: AtomicBool = AtomicBool::new(false);
static ACTIVE_TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Route Ctrl-C to `token`. The first press cancels resolution; a second
/// press exits with status 130. While the host runs, the launcher ignores
/// the signal and lets the child process handle it.
pub fn install_signal_handler(token: &CancelToken) {
    if ACTIVE_TOKEN.set(token.clone()).is_err() {
        return;
    }
    let _ = ctrlc::set_handler(move || {
        if HOST_RUNNING.load(Ordering::SeqCst) {
            return;
        }
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(INTERRUPTED_EXIT);
        }
        if let Some(token) = ACTIVE_TOKEN.get() {
            token.cancel();
        }
        eprintln!("\ninterrupt received, cancelling dependency resolution...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Mark whether a host process currently owns the terminal.
pub fn set_host_running(running: bool) {
    HOST_RUNNING.store(running, Ordering::SeqCst);
}
