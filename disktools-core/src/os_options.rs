//! Open options for raw device sessions.
//!
//! Read sessions share the device with other readers. Write sessions take the
//! device exclusively so nothing else can write underneath a transfer.
use std::fs::OpenOptions;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(windows)]
use std::os::windows::fs::OpenOptionsExt;

#[cfg(windows)]
use windows_sys::Win32::Storage::FileSystem::{FILE_SHARE_READ, FILE_SHARE_WRITE};

pub(crate) fn device_open_options(write: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(write);

    #[cfg(windows)]
    {
        if write {
            options.share_mode(0);
        } else {
            options.share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE);
        }
    }

    #[cfg(unix)]
    {
        // On Linux, O_EXCL without O_CREAT fails with EBUSY if a block device
        // is mounted. It is ignored for regular files.
        if write {
            options.custom_flags(libc::O_EXCL);
        }
    }

    options
}
