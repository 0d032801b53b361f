//! Device length and descriptor queries.
use crate::device::{DeviceDescriptor, DiskGeometry};
use crate::error::{Error, Result, Warning};
use crate::handle::DeviceHandle;
use crate::platform;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// The two size queries a device answers.
pub trait SizeQuery {
    fn path(&self) -> &Path;
    fn query_length(&self) -> io::Result<u64>;
    fn query_geometry(&self) -> io::Result<DiskGeometry>;
}

impl SizeQuery for DeviceHandle {
    fn path(&self) -> &Path {
        DeviceHandle::path(self)
    }

    fn query_length(&self) -> io::Result<u64> {
        platform::query_length(self.file())
    }

    fn query_geometry(&self) -> io::Result<DiskGeometry> {
        platform::query_geometry(self.file())
    }
}

/// Determines the true byte length of the device.
///
/// Tries the direct length query first. Removable media commonly reject it,
/// so on failure the length is computed from the drive geometry instead.
/// A length of zero from either path counts as failure.
pub fn length<T: SizeQuery + ?Sized>(device: &T) -> Result<u64> {
    let direct_err = match device.query_length() {
        Ok(0) => "length query reported zero".to_string(),
        Ok(len) => return Ok(len),
        Err(e) => e.to_string(),
    };
    debug!("direct length query failed ({direct_err}), trying geometry");

    match device.query_geometry() {
        Ok(geometry) if geometry.total_bytes() > 0 => {
            debug!(?geometry, "length derived from geometry");
            Ok(geometry.total_bytes())
        }
        Ok(_) => Err(Error::DeviceQueryFailed {
            path: device.path().to_path_buf(),
            reason: format!("{direct_err}; geometry reported zero"),
        }),
        Err(e) => Err(Error::DeviceQueryFailed {
            path: device.path().to_path_buf(),
            reason: format!("{direct_err}; geometry query failed: {e}"),
        }),
    }
}

/// Fetches the device descriptor. Best-effort: any failure is returned as a
/// [`Warning::DescriptorUnavailable`] and never aborts the session.
pub fn descriptor(handle: &DeviceHandle) -> std::result::Result<DeviceDescriptor, Warning> {
    platform::query_descriptor(handle.file()).map_err(|e| {
        let warning = Warning::DescriptorUnavailable(e.to_string());
        warn!("{warning}");
        warning
    })
}

/// Permits I/O beyond the last partition on special media. Best-effort.
pub fn enable_extended_io(handle: &DeviceHandle) -> Option<Warning> {
    match platform::enable_extended_io(handle.file()) {
        Ok(()) => None,
        Err(e) => {
            let warning = Warning::ExtendedIoUnavailable(e.to_string());
            warn!("{warning}");
            Some(warning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    struct FakeDrive {
        path: PathBuf,
        direct: Option<u64>,
        geometry: Option<DiskGeometry>,
    }

    impl SizeQuery for FakeDrive {
        fn path(&self) -> &Path {
            &self.path
        }

        fn query_length(&self) -> io::Result<u64> {
            self.direct
                .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "not supported"))
        }

        fn query_geometry(&self) -> io::Result<DiskGeometry> {
            self.geometry
                .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "not supported"))
        }
    }

    const FLOPPY: DiskGeometry = DiskGeometry {
        cylinders: 80,
        tracks_per_cylinder: 2,
        sectors_per_track: 18,
        bytes_per_sector: 512,
    };

    fn drive(direct: Option<u64>, geometry: Option<DiskGeometry>) -> FakeDrive {
        FakeDrive {
            path: PathBuf::from(r"\\.\A:"),
            direct,
            geometry,
        }
    }

    #[test]
    fn direct_length_wins_over_geometry() {
        assert_eq!(length(&drive(Some(4096), Some(FLOPPY))).unwrap(), 4096);
    }

    #[test]
    fn rejected_length_query_falls_back_to_geometry() {
        assert_eq!(length(&drive(None, Some(FLOPPY))).unwrap(), 1_474_560);
    }

    #[test]
    fn zero_length_falls_back_to_geometry() {
        assert_eq!(length(&drive(Some(0), Some(FLOPPY))).unwrap(), 1_474_560);
    }

    #[test]
    fn zero_geometry_is_a_query_failure() {
        let empty = DiskGeometry {
            cylinders: 0,
            ..FLOPPY
        };
        let err = length(&drive(None, Some(empty))).unwrap_err();
        assert!(matches!(err, Error::DeviceQueryFailed { .. }));
    }

    #[test]
    fn both_queries_failing_names_the_device() {
        match length(&drive(None, None)) {
            Err(Error::DeviceQueryFailed { path, reason }) => {
                assert_eq!(path, PathBuf::from(r"\\.\A:"));
                assert!(reason.contains("geometry query failed"));
            }
            other => panic!("expected DeviceQueryFailed, got {other:?}"),
        }
    }

    #[test]
    fn image_file_length() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![1u8; 4096]).unwrap();
        tmp.flush().unwrap();

        let handle = DeviceHandle::open_read(tmp.path()).unwrap();
        assert_eq!(length(&handle).unwrap(), 4096);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn empty_image_has_no_usable_length() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let handle = DeviceHandle::open_read(tmp.path()).unwrap();
        assert!(matches!(
            length(&handle),
            Err(Error::DeviceQueryFailed { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn descriptor_failure_is_a_warning() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let handle = DeviceHandle::open_read(tmp.path()).unwrap();
        assert!(matches!(
            descriptor(&handle),
            Err(Warning::DescriptorUnavailable(_))
        ));
    }
}
