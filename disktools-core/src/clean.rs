//! Destructive device preparation: removing the partition layout, and
//! overwriting a range of the device with zeros.
use crate::copy::{Sink, Source, StreamCopier, TransferOptions, TransferReport};
use crate::erase::{self, Confirmation, EraseOutcome};
use crate::error::{Error, Result, Warning};
use crate::handle::DeviceHandle;
use crate::inspect;
use crate::plan;
use crate::platform;
use crate::progress::ProgressSample;
use crate::session::{self, SessionInfo};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

/// Removes the partition layout (partitions, MBR, GPT) of a device.
///
/// Without confirmation this returns [`EraseOutcome::NotConfirmed`] without
/// opening the device at all.
pub fn run(device_path: &Path, confirmation: Confirmation) -> Result<EraseOutcome> {
    if confirmation != Confirmation::Confirmed {
        return Ok(EraseOutcome::NotConfirmed);
    }

    let mut device = DeviceHandle::open_write(device_path)?;
    // Best-effort; a failure is logged inside and erase() reports anything fatal.
    inspect::enable_extended_io(&device);

    let outcome = erase::erase(&mut device, confirmation)?;
    info!(path = %device_path.display(), ?outcome, "clean finished");
    Ok(outcome)
}

/// Overwrites a range of the device with zeros.
///
/// `offset_sectors` and `max_bytes` are planned exactly as for a dump; with
/// `max_bytes == 0` the device is zeroed to its end.
pub fn zero<F>(
    device_path: &Path,
    offset_sectors: u64,
    max_bytes: u64,
    confirmation: Confirmation,
    options: TransferOptions,
    running: Arc<AtomicBool>,
    on_start: impl FnOnce(&SessionInfo),
    on_progress: F,
) -> Result<TransferReport>
where
    F: FnMut(&ProgressSample),
{
    if confirmation != Confirmation::Confirmed {
        return Err(Error::NotConfirmed);
    }

    let mut device = DeviceHandle::open_write(device_path)?;
    device.lock()?;

    let mut warnings = Vec::new();
    let summary = session::probe(&device, &mut warnings)?;
    let range = plan::plan(summary.length, offset_sectors, max_bytes)?;
    on_start(&SessionInfo {
        device: summary,
        range,
    });

    device.seek_to(range.start_offset)?;
    info!(
        offset = range.start_offset,
        length = range.length,
        "zeroing {}",
        device_path.display()
    );

    let mut report = StreamCopier::new(options).run(
        Source::Zero,
        Sink::Device(&mut device),
        &range,
        &running,
        on_progress,
    )?;

    if let Err(e) = device.unlock() {
        let warning = Warning::UnlockFailed(e.to_string());
        warn!("{warning}");
        warnings.push(warning);
    }
    if range.start_offset == 0 {
        if let Err(e) = platform::refresh_layout(device.file()) {
            let warning = Warning::RefreshFailed(e.to_string());
            warn!("{warning}");
            warnings.push(warning);
        }
    }

    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}
