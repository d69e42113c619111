//! Run lock: a marker file that keeps backup runs from overlapping.
//!
//! The marker is published with create-if-absent semantics, so its presence
//! alone decides whether a run may start. The owning process holds an OS
//! advisory lock on the marker for its whole lifetime; the kernel drops that
//! lock when the process dies, which is what lets [`RunLock::holder`] tell a
//! live owner from a stale marker.
//!
//! The advisory lock is taken on a private staging file before that file is
//! hard-linked into place, so no other process can ever observe the marker
//! without its lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Guard for an acquired run lock. Dropping it removes the marker.
#[derive(Debug)]
pub struct RunLock {
    lock_file: Option<File>,
    lock_path: PathBuf,
    acquired_at: DateTime<Utc>,
}

impl RunLock {
    /// Publish the marker, failing with `AlreadyRunning` if it exists.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = staging_path(lock_path);
        let published = publish(lock_path, &staging);
        match fs::remove_file(&staging) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => debug!(path = %staging.display(), error = %err, "cannot remove staging file"),
        }
        let lock_file = published?;

        debug!(path = %lock_path.display(), pid = std::process::id(), "acquired run lock");
        Ok(Self {
            lock_file: Some(lock_file),
            lock_path: lock_path.to_path_buf(),
            acquired_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    #[must_use]
    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Remove the marker. Safe to call more than once.
    pub fn release(&mut self) {
        if let Err(err) = Self::release_path(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %err, "failed to remove lock marker");
        }
        if let Some(file) = self.lock_file.take() {
            // Closing the handle drops the advisory lock as well.
            if let Err(err) = FileExt::unlock(&file) {
                debug!("failed to release advisory lock: {}", err);
            }
        }
    }

    /// Remove a marker by path. Returns whether a marker was present.
    pub fn release_path(lock_path: &Path) -> io::Result<bool> {
        match fs::remove_file(lock_path) {
            Ok(()) => {
                debug!(path = %lock_path.display(), "released run lock");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Remove the marker only if it records this process as its owner.
    ///
    /// This is the release used on signal delivery, where the guard lives on
    /// another thread and may not have acquired the marker at all.
    pub fn release_if_owned(lock_path: &Path) -> io::Result<bool> {
        if read_pid(lock_path) != Some(std::process::id()) {
            return Ok(false);
        }
        Self::release_path(lock_path)
    }

    /// Inspect the marker without acquiring it.
    pub fn holder(lock_path: &Path) -> Result<Option<LockHolder>> {
        Ok(Self::inspect(lock_path)?.map(|(holder, _)| holder))
    }

    /// Remove the marker if no live process owns it.
    ///
    /// Returns the holder that was cleared, or `None` when there was no
    /// marker, its owner is still running, or it was replaced meanwhile.
    pub fn reclaim_if_stale(lock_path: &Path) -> Result<Option<LockHolder>> {
        // The inspecting handle keeps the dead marker's advisory lock until the
        // marker is gone, so no other reclaimer can act on it concurrently.
        let Some((holder, Some(stale))) = Self::inspect(lock_path)? else {
            return Ok(None);
        };
        if !same_file(&stale, lock_path) {
            debug!(path = %lock_path.display(), "marker replaced while inspecting");
            return Ok(None);
        }

        warn!(
            path = %lock_path.display(),
            pid = ?holder.pid,
            "reclaiming stale lock marker"
        );
        Self::release_path(lock_path)?;
        drop(stale);
        info!("stale lock marker removed");
        Ok(Some(holder))
    }

    /// Describe the marker. For a stale marker the returned handle still
    /// holds its advisory lock.
    fn inspect(lock_path: &Path) -> Result<Option<(LockHolder, Option<File>)>> {
        let file = match OpenOptions::new().read(true).open(lock_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let since = file
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        let stale_handle = match file.try_lock_exclusive() {
            Ok(()) => Some(file),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => None,
            Err(err) => {
                // Cannot test the lock: assume the owner is alive so nothing gets reclaimed.
                debug!(path = %lock_path.display(), error = %err, "cannot test lock marker");
                None
            }
        };

        let holder = LockHolder {
            path: lock_path.to_path_buf(),
            pid: read_pid(lock_path),
            since,
            alive: stale_handle.is_none(),
        };
        Ok(Some((holder, stale_handle)))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// What is known about the owner of an existing marker.
#[derive(Debug, Clone, Serialize)]
pub struct LockHolder {
    pub path: PathBuf,
    /// Process ID recorded in the marker, if readable.
    pub pid: Option<u32>,
    /// Marker modification time.
    pub since: Option<DateTime<Utc>>,
    /// Whether a live process still holds the advisory lock.
    pub alive: bool,
}

/// Lock, fill and link a staging file into place as the marker.
fn publish(lock_path: &Path, staging: &Path) -> Result<File> {
    let failed = |action: &str, err: io::Error| {
        BackupError::LockFailed(format!("{action} {}: {err}", staging.display()))
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(staging)
        .map_err(|err| failed("create", err))?;

    match file.lock_exclusive() {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::Unsupported => {
            debug!(path = %staging.display(), error = %err, "advisory locks unsupported, stale detection disabled");
        }
        Err(err) => return Err(failed("lock", err)),
    }

    write!(file, "{}", std::process::id())
        .and_then(|()| file.flush())
        .map_err(|err| failed("write", err))?;

    match fs::hard_link(staging, lock_path) {
        Ok(()) => Ok(file),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(BackupError::AlreadyRunning {
            path: lock_path.to_path_buf(),
            pid: read_pid(lock_path),
        }),
        Err(err) => Err(BackupError::LockFailed(format!(
            "publish {}: {err}",
            lock_path.display()
        ))),
    }
}

fn staging_path(lock_path: &Path) -> PathBuf {
    let name = lock_path
        .file_name()
        .map_or_else(|| "backup.lock".into(), |name| name.to_string_lossy());
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    lock_path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(open), Ok(current)) => open.dev() == current.dev() && open.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn read_pid(lock_path: &Path) -> Option<u32> {
    fs::read_to_string(lock_path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
}
