//! Destructive removal of a device's partition layout.
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::platform;
use std::io;
use std::path::Path;
use tracing::info;

/// Affirmative token the caller must supply before anything irreversible runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    NotConfirmed,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::NotConfirmed
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseOutcome {
    /// The layout was deleted and the device flushed.
    Cleared,
    /// No confirmation was given; the device was not touched.
    NotConfirmed,
}

/// The device operations layout erasure needs.
pub trait LayoutTarget {
    fn path(&self) -> &Path;
    fn is_writable(&self) -> bool;
    fn lock(&mut self) -> Result<()>;
    fn delete_layout(&mut self) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LayoutTarget for DeviceHandle {
    fn path(&self) -> &Path {
        DeviceHandle::path(self)
    }

    fn is_writable(&self) -> bool {
        DeviceHandle::is_writable(self)
    }

    fn lock(&mut self) -> Result<()> {
        DeviceHandle::lock(self)
    }

    fn delete_layout(&mut self) -> io::Result<()> {
        platform::delete_layout(self.file())
    }

    fn sync(&mut self) -> io::Result<()> {
        DeviceHandle::sync(self)
    }
}

/// Deletes the partition table / MBR / GPT of `target`.
///
/// Without [`Confirmation::Confirmed`] this returns
/// [`EraseOutcome::NotConfirmed`] immediately, before the lock is attempted.
/// The volume must lock successfully; proceeding on a mounted filesystem
/// would corrupt it.
pub fn erase<T: LayoutTarget>(target: &mut T, confirmation: Confirmation) -> Result<EraseOutcome> {
    if confirmation != Confirmation::Confirmed {
        info!(path = %target.path().display(), "layout erase not confirmed, device untouched");
        return Ok(EraseOutcome::NotConfirmed);
    }

    let clear_failed = |path: &Path, source| Error::LayoutClearFailed {
        path: path.to_path_buf(),
        source,
    };

    if !target.is_writable() {
        return Err(clear_failed(
            target.path(),
            io::Error::new(
                io::ErrorKind::PermissionDenied,
                "device not opened for writing",
            ),
        ));
    }

    target.lock()?;

    info!(path = %target.path().display(), "deleting drive layout");
    if let Err(e) = target.delete_layout() {
        return Err(clear_failed(target.path(), e));
    }
    if let Err(e) = target.sync() {
        return Err(clear_failed(target.path(), e));
    }

    Ok(EraseOutcome::Cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[derive(Default)]
    struct MockTarget {
        path: PathBuf,
        read_only: bool,
        refuse_lock: bool,
        refuse_delete: bool,
        calls: Vec<&'static str>,
    }

    impl LayoutTarget for MockTarget {
        fn path(&self) -> &Path {
            &self.path
        }

        fn is_writable(&self) -> bool {
            !self.read_only
        }

        fn lock(&mut self) -> Result<()> {
            self.calls.push("lock");
            if self.refuse_lock {
                return Err(Error::VolumeLockFailed {
                    path: self.path.clone(),
                    source: io::Error::other("volume in use"),
                });
            }
            Ok(())
        }

        fn delete_layout(&mut self) -> io::Result<()> {
            self.calls.push("delete");
            if self.refuse_delete {
                return Err(io::Error::other("not supported"));
            }
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            self.calls.push("sync");
            Ok(())
        }
    }

    #[test]
    fn unconfirmed_erase_touches_nothing() {
        let mut target = MockTarget::default();
        let outcome = erase(&mut target, Confirmation::NotConfirmed).unwrap();

        assert_eq!(outcome, EraseOutcome::NotConfirmed);
        assert!(target.calls.is_empty());
    }

    #[test]
    fn confirmed_erase_locks_deletes_and_flushes() {
        let mut target = MockTarget::default();
        let outcome = erase(&mut target, true.into()).unwrap();

        assert_eq!(outcome, EraseOutcome::Cleared);
        assert_eq!(target.calls, vec!["lock", "delete", "sync"]);
    }

    #[test]
    fn lock_failure_prevents_delete() {
        let mut target = MockTarget {
            refuse_lock: true,
            ..Default::default()
        };
        let err = erase(&mut target, Confirmation::Confirmed).unwrap_err();

        assert!(matches!(err, Error::VolumeLockFailed { .. }));
        assert_eq!(target.calls, vec!["lock"]);
    }

    #[test]
    fn delete_failure_is_reported() {
        let mut target = MockTarget {
            refuse_delete: true,
            ..Default::default()
        };
        let err = erase(&mut target, Confirmation::Confirmed).unwrap_err();

        assert!(matches!(err, Error::LayoutClearFailed { .. }));
        assert_eq!(target.calls, vec!["lock", "delete"]);
    }

    #[test]
    fn read_only_handle_is_refused() {
        let mut target = MockTarget {
            read_only: true,
            ..Default::default()
        };
        let err = erase(&mut target, Confirmation::Confirmed).unwrap_err();

        assert!(matches!(err, Error::LayoutClearFailed { .. }));
        assert!(target.calls.is_empty());
    }
}
