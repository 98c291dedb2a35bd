//! Exclusive directory lock: one process per database.
//!
//! The lock is taken on `<dir>/.lock` without blocking and released when the
//! [`FileLock`] is dropped (closing the descriptor releases it).

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Name of the lock file inside a database directory.
pub const LOCK_FILE: &str = ".lock";

/// Held exclusive lock on a database directory.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock on `dir`.
    ///
    /// # Errors
    /// `ErrorKind::WouldBlock` if another handle holds it; any I/O error from
    /// creating the lock file.
    pub fn acquire(dir: &Path) -> IoResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        try_lock(&file)?;
        tracing::debug!(path = %path.display(), "database lock acquired");

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> IoResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and valid for this call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }

    let err = IoError::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(IoError::new(
            ErrorKind::WouldBlock,
            "database is locked by another process",
        ))
    } else {
        Err(err)
    }
}

#[cfg(windows)]
fn try_lock(file: &File) -> IoResult<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    let handle = file.as_raw_handle() as HANDLE;
    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data and
    // zero is a valid initial state for it.
    let ok = unsafe {
        let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };

    if ok == 0 {
        return Err(IoError::new(
            ErrorKind::WouldBlock,
            format!(
                "database is locked by another process: {}",
                IoError::last_os_error()
            ),
        ));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn try_lock(_file: &File) -> IoResult<()> {
    Err(IoError::new(
        ErrorKind::Unsupported,
        "file locking not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();

        let lock = FileLock::acquire(dir.path()).unwrap();
        assert!(lock.path().ends_with(LOCK_FILE));

        let err = FileLock::acquire(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        drop(lock);
        FileLock::acquire(dir.path()).unwrap();
    }
}
