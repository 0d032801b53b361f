//! Ownership of an open raw device.
use crate::error::{Error, Result};
use crate::os_options::device_open_options;
use crate::platform;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An open connection to a raw block device (or a file standing in for one).
///
/// The handle is exclusively owned by the session that opened it. If the
/// volume was locked through [`DeviceHandle::lock`], it is unlocked before the
/// underlying handle is closed on drop.
#[derive(Debug)]
pub struct DeviceHandle {
    file: File,
    path: PathBuf,
    writable: bool,
    locked: bool,
}

impl DeviceHandle {
    /// Opens a device for reading, sharing it with other readers.
    pub fn open_read(path: &Path) -> Result<Self> {
        Self::open(path, false)
    }

    /// Opens a device for reading and writing, exclusively.
    pub fn open_write(path: &Path) -> Result<Self> {
        Self::open(path, true)
    }

    fn open(path: &Path, writable: bool) -> Result<Self> {
        let file = device_open_options(writable)
            .open(path)
            .map_err(|source| Error::DeviceOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), writable, "opened device");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            writable,
            locked: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Access to the raw file for platform primitives.
    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Locks the volume so no mounted filesystem can write underneath us.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Ok(());
        }
        platform::lock_volume(&self.file).map_err(|source| Error::VolumeLockFailed {
            path: self.path.clone(),
            source,
        })?;
        self.locked = true;
        debug!(path = %self.path.display(), "volume locked");
        Ok(())
    }

    /// Releases the volume lock if one is held.
    pub fn unlock(&mut self) -> io::Result<()> {
        if !self.locked {
            return Ok(());
        }
        platform::unlock_volume(&self.file)?;
        self.locked = false;
        debug!(path = %self.path.display(), "volume unlocked");
        Ok(())
    }

    /// Positions the handle at `offset` bytes from the start of the device.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| Error::Seek {
                path: self.path.clone(),
                offset,
                source,
            })?;
        Ok(())
    }

    /// Flushes the device's write buffers.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl Read for DeviceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for DeviceHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!(path = %self.path.display(), "failed to unlock volume on close: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeviceHandle::open_read(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::DeviceOpenFailed { .. }));
    }

    #[test]
    fn lock_is_tracked_and_released() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut handle = DeviceHandle::open_write(tmp.path()).unwrap();
        assert!(handle.is_writable());
        assert!(!handle.is_locked());

        handle.lock().unwrap();
        assert!(handle.is_locked());
        handle.unlock().unwrap();
        assert!(!handle.is_locked());
    }
}
