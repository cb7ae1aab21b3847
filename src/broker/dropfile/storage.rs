// src/broker/dropfile/storage.rs

//! Blocking filesystem primitives of the dropfile broker.
//!
//! Every function here runs on tokio's blocking pool. Errors are classified
//! per call: a file vanishing between listing and opening, or a lock held by
//! another consumer, is a benign race and the scan moves on. A scan also
//! moves past any single entry it cannot open or lock, with a warning.
//! Anything else is returned as [`QueueError::Io`].

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::naming::{is_message_file, message_file_name};
use crate::{QueueError, Result};

/// A message file held under an exclusive lock.
///
/// Dropping it closes the handle, which releases the lock and leaves the
/// content intact.
#[derive(Debug)]
pub(super) struct LockedFile {
    pub path: PathBuf,
    pub file: File,
    pub content: Vec<u8>,
}

/// Create `path` as a directory (and its parents) and check it is writable.
pub(super) fn ensure_dir(path: &Path) -> Result<()> {
    // ---
    if let Err(e) = fs::create_dir_all(path) {
        // Another process may have created it between our check and mkdir.
        if !path.is_dir() {
            return Err(QueueError::io(format!("creating {}", path.display()), e));
        }
    }

    let meta = fs::metadata(path)
        .map_err(|e| QueueError::io(format!("inspecting {}", path.display()), e))?;

    if !meta.is_dir() {
        return Err(QueueError::Configuration(format!(
            "{} exists but is not a directory",
            path.display()
        )));
    }
    if meta.permissions().readonly() {
        return Err(QueueError::Configuration(format!(
            "cannot write to {}",
            path.display()
        )));
    }
    Ok(())
}

/// Write `content` as a new message file in `dir`.
///
/// The bytes go to a hidden temporary file first, which is fsynced and then
/// moved into place without overwriting anything. Readers therefore see
/// either no file or the complete content. If the generated name is taken a
/// new one is generated. On failure the temporary file is removed.
pub(super) fn write_message(dir: &Path, extension: &str, content: &[u8]) -> Result<PathBuf> {
    // ---
    let mut builder = tempfile::Builder::new();
    builder.prefix(".pending-").suffix(".tmp");
    #[cfg(unix)]
    {
        // Consumers may run as other users; the umask decides, not tempfile's 0600.
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let mut tmp = builder
        .tempfile_in(dir)
        .map_err(|e| QueueError::io(format!("creating temporary file in {}", dir.display()), e))?;

    tmp.write_all(content)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| QueueError::io("writing message", e))?;

    loop {
        let path = dir.join(message_file_name(extension));

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                if let Err(e) = sync_dir(dir) {
                    let _ = fs::remove_file(&path);
                    return Err(QueueError::io(format!("syncing {}", dir.display()), e));
                }
                return Ok(path);
            }
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                crate::log_debug!("message name {} already taken, regenerating", path.display());
                tmp = err.file;
            }
            Err(err) => {
                return Err(QueueError::io(
                    format!("moving message into {}", path.display()),
                    err.error,
                ));
            }
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Scan `dir` once and lock the first claimable message file.
///
/// Entries that are not message files, are empty, are gone, or are locked by
/// someone else are skipped. Empty files are removed on the way. An entry
/// that cannot be inspected, opened, or locked is logged and skipped so the
/// rest of the queue stays deliverable; only a failure to list `dir` is an
/// error. Returns `Ok(None)` when the scan finds nothing to claim.
pub(super) fn claim_first(dir: &Path, extension: &str) -> Result<Option<LockedFile>> {
    claim_first_with(dir, extension, try_lock_message)
}

fn claim_first_with<L>(dir: &Path, extension: &str, mut lock: L) -> Result<Option<LockedFile>>
where
    L: FnMut(PathBuf) -> Result<Option<LockedFile>>,
{
    // ---
    let entries =
        fs::read_dir(dir).map_err(|e| QueueError::io(format!("listing {}", dir.display()), e))?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_benign(&e) => continue,
            Err(e) => return Err(QueueError::io(format!("listing {}", dir.display()), e)),
        };

        let path = entry.path();
        if !is_message_file(&path, extension) {
            continue;
        }

        match entry.file_type() {
            Ok(ft) if ft.is_file() => {}
            Ok(_) => continue,
            Err(e) if is_benign(&e) => continue,
            Err(_e) => {
                crate::log_warn!("skipping {}, cannot inspect it: {_e}", path.display());
                continue;
            }
        }

        match entry.metadata() {
            Ok(meta) if meta.len() == 0 => {
                crate::log_trace!("removing empty message file {}", path.display());
                remove_if_present(&path);
                continue;
            }
            Ok(_) => {}
            Err(e) if is_benign(&e) => continue,
            Err(_e) => {
                crate::log_warn!("skipping {}, cannot inspect it: {_e}", path.display());
                continue;
            }
        }

        match lock(path) {
            Ok(Some(locked)) => return Ok(Some(locked)),
            Ok(None) => {}
            Err(_e) => {
                crate::log_warn!("skipping unclaimable message: {_e}");
            }
        }
    }

    Ok(None)
}

/// Open, lock, and read one message file.
fn try_lock_message(path: PathBuf) -> Result<Option<LockedFile>> {
    // ---
    let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
        Ok(file) => file,
        Err(e) if is_benign(&e) => return Ok(None),
        Err(e) => return Err(QueueError::io(format!("opening {}", path.display()), e)),
    };

    match file.try_lock() {
        Ok(()) => {}
        Err(TryLockError::WouldBlock) => {
            crate::log_trace!("{} is claimed elsewhere, skipping", path.display());
            return Ok(None);
        }
        Err(TryLockError::Error(e)) => {
            return Err(QueueError::io(format!("locking {}", path.display()), e));
        }
    }

    let mut content = Vec::new();
    if let Err(e) = file
        .seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut content))
    {
        let _ = file.unlock();
        return Err(QueueError::io(format!("reading {}", path.display()), e));
    }

    if content.is_empty() {
        // Resolved by another consumer between our size check and the lock.
        let _ = file.unlock();
        drop(file);
        remove_if_present(&path);
        return Ok(None);
    }

    Ok(Some(LockedFile {
        path,
        file,
        content,
    }))
}

/// Truncate a locked message to zero length, marking it resolved.
///
/// The lock is released and the handle closed whether or not truncation
/// succeeds.
pub(super) fn truncate_and_release(locked: LockedFile) -> Result<PathBuf> {
    // ---
    let LockedFile { path, file, .. } = locked;

    let result = file.set_len(0).and_then(|_| file.sync_data());
    let _ = file.unlock();
    drop(file);

    result.map_err(|e| QueueError::io(format!("truncating {}", path.display()), e))?;
    Ok(path)
}

/// Release the lock on a message without touching its content.
pub(super) fn release(locked: LockedFile) {
    // ---
    let LockedFile { path, file, .. } = locked;
    if let Err(_e) = file.unlock() {
        crate::log_debug!("unlock of {} failed ({_e}), closing handle", path.display());
    }
}

/// Delete a file, treating "already gone" as success.
pub(super) fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn remove_if_present(path: &Path) {
    if let Err(_e) = remove_file(path) {
        crate::log_debug!("could not remove {}: {_e}", path.display());
    }
}

fn is_benign(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_message_creates_complete_file() {
        // ---
        let dir = TempDir::new().unwrap();

        let path = write_message(dir.path(), "msg", b"payload").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"payload");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1, "temporary file left behind: {names:?}");
    }

    #[test]
    fn test_write_message_into_missing_dir_leaves_nothing() {
        // ---
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");

        let err = write_message(&missing, "msg", b"payload").unwrap_err();

        assert!(matches!(err, QueueError::Io { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn test_claim_skips_locked_and_removes_empty() {
        // ---
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("00000000000000000001x.msg"), b"").unwrap();
        fs::write(dir.path().join("ignored.txt"), b"not a message").unwrap();
        let path = write_message(dir.path(), "msg", b"only").unwrap();

        let first = claim_first(dir.path(), "msg").unwrap().expect("claim");
        assert_eq!(first.path, path);
        assert_eq!(first.content, b"only");

        // Held by `first`, so a second scan must not return it.
        assert!(claim_first(dir.path(), "msg").unwrap().is_none());
        assert!(!dir.path().join("00000000000000000001x.msg").exists());
        assert!(dir.path().join("ignored.txt").exists());

        release(first);
        assert!(claim_first(dir.path(), "msg").unwrap().is_some());
    }

    #[test]
    fn test_claim_skips_entry_that_fails_to_lock() {
        // ---
        let dir = TempDir::new().unwrap();
        write_message(dir.path(), "msg", b"first").unwrap();
        write_message(dir.path(), "msg", b"second").unwrap();

        let mut refused: Option<PathBuf> = None;
        let locked = claim_first_with(dir.path(), "msg", |path| {
            if refused.is_none() {
                refused = Some(path.clone());
                return Err(QueueError::io(
                    format!("opening {}", path.display()),
                    io::Error::from(io::ErrorKind::PermissionDenied),
                ));
            }
            try_lock_message(path)
        })
        .unwrap()
        .expect("the healthy message should still be claimed");

        let refused = refused.unwrap();
        assert_ne!(locked.path, refused);
        assert!(refused.exists(), "a skipped message must be left alone");
    }

    #[cfg(unix)]
    #[test]
    fn test_message_files_follow_umask() {
        // ---
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = write_message(dir.path(), "msg", b"shared").unwrap();
        let plain = dir.path().join("plain.txt");
        fs::write(&plain, b"x").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&plain));
    }

    #[test]
    fn test_truncate_marks_resolved() {
        // ---
        let dir = TempDir::new().unwrap();
        write_message(dir.path(), "msg", b"data").unwrap();

        let locked = claim_first(dir.path(), "msg").unwrap().unwrap();
        let path = truncate_and_release(locked).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(claim_first(dir.path(), "msg").unwrap().is_none());
        assert!(!path.exists(), "scan should clean up the resolved file");
    }

    #[test]
    fn test_remove_file_tolerates_missing() {
        // ---
        let dir = TempDir::new().unwrap();
        assert!(remove_file(&dir.path().join("nope.msg")).is_ok());
    }
}
