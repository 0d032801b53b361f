//! Shared setup for every device session: inspect the opened device once and
//! collect whatever non-fatal warnings that produced.
use crate::device::DeviceDescriptor;
use crate::error::{Result, Warning};
use crate::handle::DeviceHandle;
use crate::inspect;
use crate::plan::ByteRange;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// What is known about a device once it has been opened and inspected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSummary {
    pub path: PathBuf,
    pub length: u64,
    /// `None` when the descriptor query failed; informational only.
    pub descriptor: Option<DeviceDescriptor>,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ident = match &self.descriptor {
            Some(d) => d.to_string(),
            None => "(n/a)".to_string(),
        };
        write!(
            f,
            "{} {} {:.1} MB ({} bytes)",
            self.path.display(),
            ident,
            self.length as f64 / 1024.0 / 1024.0,
            self.length
        )
    }
}

/// Handed to `on_start` callbacks once a transfer has been planned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub device: DeviceSummary,
    pub range: ByteRange,
}

/// Enables extended I/O, then queries length (fatal) and descriptor (not).
pub(crate) fn probe(handle: &DeviceHandle, warnings: &mut Vec<Warning>) -> Result<DeviceSummary> {
    warnings.extend(inspect::enable_extended_io(handle));
    let length = inspect::length(handle)?;
    let descriptor = match inspect::descriptor(handle) {
        Ok(d) => Some(d),
        Err(w) => {
            warnings.push(w);
            None
        }
    };

    let summary = DeviceSummary {
        path: handle.path().to_path_buf(),
        length,
        descriptor,
    };
    info!("Disk {summary}");
    Ok(summary)
}

/// Opens a device read-only and describes it without changing anything.
pub fn describe(device_path: &Path) -> Result<DeviceSummary> {
    let handle = DeviceHandle::open_read(device_path)?;
    probe(&handle, &mut Vec::new())
}
