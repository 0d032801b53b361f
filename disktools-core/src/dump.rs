//! Contains the logic for dumping a device's raw bytes to a file.
use crate::copy::{Sink, Source, StreamCopier, TransferOptions, TransferReport};
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::plan;
use crate::progress::ProgressSample;
use crate::session::{self, SessionInfo};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

/// Copies a device (or part of it) into a new file.
///
/// The range is validated before the output file is created, so an invalid
/// offset or maximum leaves no file behind.
///
/// # Arguments
///
/// * `device_path` - The device to read from.
/// * `image_path` - The file to create (overwritten if it exists).
/// * `offset_sectors` - Number of 512-byte sectors to skip at the start.
/// * `max_bytes` - Bytes to copy, or `0` for everything up to the device end.
/// * `running` - Cleared to cancel. A cancelled dump removes its partial file.
/// * `on_start` - Called once the plan is known, before any data is read.
/// * `on_progress` - Called periodically with a [`ProgressSample`].
///
/// # Errors
///
/// Fails if the device cannot be opened or measured, the range is invalid,
/// the output cannot be created, or an I/O error occurs mid-transfer.
pub fn run<F>(
    device_path: &Path,
    image_path: &Path,
    offset_sectors: u64,
    max_bytes: u64,
    options: TransferOptions,
    running: Arc<AtomicBool>,
    on_start: impl FnOnce(&SessionInfo),
    on_progress: F,
) -> Result<TransferReport>
where
    F: FnMut(&ProgressSample),
{
    let mut device = DeviceHandle::open_read(device_path)?;
    let mut warnings = Vec::new();
    let summary = session::probe(&device, &mut warnings)?;

    let range = plan::plan(summary.length, offset_sectors, max_bytes)?;
    on_start(&SessionInfo {
        device: summary,
        range,
    });

    device.seek_to(range.start_offset)?;

    let mut image_file = File::create(image_path).map_err(|source| Error::FileOpenFailed {
        path: image_path.to_path_buf(),
        source,
    })?;

    info!(
        offset = range.start_offset,
        length = range.length,
        "dumping {} to {}",
        device_path.display(),
        image_path.display()
    );

    let result = StreamCopier::new(options).run(
        Source::Stream(&mut device),
        Sink::File(&mut image_file),
        &range,
        &running,
        on_progress,
    );

    match result {
        Ok(mut report) => {
            warnings.append(&mut report.warnings);
            report.warnings = warnings;
            Ok(report)
        }
        // The copier only reports cancellation while planned bytes are missing.
        Err(Error::Cancelled) => {
            drop(image_file);
            if let Err(e) = fs::remove_file(image_path) {
                warn!("could not remove partial dump {}: {e}", image_path.display());
            }
            Err(Error::Cancelled)
        }
        Err(e) => Err(e),
    }
}
