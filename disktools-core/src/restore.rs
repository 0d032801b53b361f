//! Contains the logic for writing a file's raw bytes back to a device.
//!
//! This module handles the multi-stage process of restoring, which includes:
//! 1.  Decompressing the image file to a temporary file if it is compressed
//!     (`.gz`, `.xz`, `.zst`), so its plain size is known up front.
//! 2.  Locking the target volume and planning the range against its length.
//! 3.  Deleting the drive layout when writing from sector 0.
//! 4.  Streaming the image onto the device and refreshing its partition view.
use crate::copy::{Sink, Source, StreamCopier, TransferOptions, TransferReport};
use crate::erase::{self, Confirmation};
use crate::error::{Error, Result, Warning};
use crate::handle::DeviceHandle;
use crate::plan;
use crate::platform;
use crate::progress::ProgressSample;
use crate::session::{self, SessionInfo};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::{NamedTempFile, TempPath};
use tracing::{info, warn};
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

/// Manages the lifetime of a decompressed image file.
/// If the image was decompressed to a temp file, this struct holds the handle
/// and will delete the file on drop.
struct PlainImage {
    path: PathBuf,
    _temp_handle: Option<TempPath>,
}

impl AsRef<Path> for PlainImage {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Returns `true` if the file extension names a supported compression format.
pub fn is_compressed(path: &Path) -> bool {
    compression_of(path).is_some()
}

#[derive(Clone, Copy)]
enum Compression {
    Gzip,
    Xz,
    Zstd,
}

fn compression_of(path: &Path) -> Option<Compression> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "gz" | "gzip" => Some(Compression::Gzip),
        "xz" => Some(Compression::Xz),
        "zst" | "zstd" => Some(Compression::Zstd),
        _ => None,
    }
}

/// Decompresses an image to a temporary file if necessary.
fn decompress_image<F>(
    input_path: &Path,
    running: &AtomicBool,
    mut on_progress: F,
) -> io::Result<PlainImage>
where
    F: FnMut(u64),
{
    let Some(compression) = compression_of(input_path) else {
        return Ok(PlainImage {
            path: input_path.to_path_buf(),
            _temp_handle: None,
        });
    };

    let input = BufReader::new(File::open(input_path)?);
    let mut reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(input)),
        Compression::Xz => Box::new(XzDecoder::new(input)),
        Compression::Zstd => Box::new(ZstdDecoder::new(input)?),
    };

    let mut temp_file = NamedTempFile::new()?;
    {
        let mut writer = BufWriter::new(&mut temp_file);
        let mut buffer = vec![0u8; 64 * 1024];
        let mut total: u64 = 0;

        loop {
            if !running.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "Operation cancelled by user",
                ));
            }

            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
            total += n as u64;
            on_progress(total);
        }
        writer.flush()?;
    }

    let temp_path = temp_file.into_temp_path();
    Ok(PlainImage {
        path: temp_path.to_path_buf(),
        _temp_handle: Some(temp_path),
    })
}

/// Writes an image file onto a device.
///
/// # Arguments
///
/// * `image_path` - Source image. May be compressed.
/// * `device_path` - Target device.
/// * `offset_sectors` - 512-byte sectors to skip on the device before writing.
/// * `max_bytes` - Bytes to write, or `0` for the whole image.
/// * `confirmation` - Must be [`Confirmation::Confirmed`]; otherwise nothing
///   is opened and [`Error::NotConfirmed`] is returned.
/// * `running` - Cleared to cancel between blocks. Already written data stays.
/// * `on_decompress_progress` - Bytes decompressed so far, for compressed images.
/// * `on_start` - Called once the plan is known, before the layout is touched.
/// * `on_progress` - Called periodically with a [`ProgressSample`].
///
/// An image that extends past the end of the device is reported as a
/// [`Warning::ExceedsDevice`] and the write proceeds up to the device end.
pub fn run<D, F>(
    image_path: &Path,
    device_path: &Path,
    offset_sectors: u64,
    max_bytes: u64,
    confirmation: Confirmation,
    options: TransferOptions,
    running: Arc<AtomicBool>,
    on_decompress_progress: D,
    on_start: impl FnOnce(&SessionInfo),
    on_progress: F,
) -> Result<TransferReport>
where
    D: FnMut(u64),
    F: FnMut(&ProgressSample),
{
    if confirmation != Confirmation::Confirmed {
        return Err(Error::NotConfirmed);
    }

    let file_err = |source| Error::FileOpenFailed {
        path: image_path.to_path_buf(),
        source,
    };

    let image = match decompress_image(image_path, &running, on_decompress_progress) {
        Ok(img) => img,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(Error::Cancelled),
        Err(e) => return Err(file_err(e)),
    };
    let mut image_file = File::open(&image).map_err(file_err)?;
    let file_length = image_file.metadata().map_err(file_err)?.len();

    let mut device = DeviceHandle::open_write(device_path)?;
    device.lock()?;

    let mut warnings = Vec::new();
    let summary = session::probe(&device, &mut warnings)?;
    let (range, exceeds) =
        plan::plan_from_file(summary.length, offset_sectors, max_bytes, file_length)?;
    warnings.extend(exceeds);

    on_start(&SessionInfo {
        device: summary,
        range,
    });

    if range.start_offset == 0 {
        info!("Offset at sector 0, deleting disk partitions");
        erase::erase(&mut device, confirmation)?;
    }

    device.seek_to(range.start_offset)?;

    info!(
        offset = range.start_offset,
        length = range.length,
        "restoring {} to {}",
        image_path.display(),
        device_path.display()
    );

    let mut report = StreamCopier::new(options).run(
        Source::Stream(&mut image_file),
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
    if let Err(e) = platform::refresh_layout(device.file()) {
        let warning = Warning::RefreshFailed(e.to_string());
        warn!("{warning}");
        warnings.push(warning);
    }

    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_is_detected_by_extension() {
        assert!(is_compressed(Path::new("disk.img.gz")));
        assert!(is_compressed(Path::new("disk.img.XZ")));
        assert!(is_compressed(Path::new("disk.zst")));
        assert!(!is_compressed(Path::new("disk.img")));
        assert!(!is_compressed(Path::new("disk")));
    }

    #[test]
    fn gzip_image_is_inflated_to_temp_file() {
        use flate2::Compression as Level;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.img.gz");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Level::default());
        enc.write_all(&payload).unwrap();
        enc.finish().unwrap();

        let running = AtomicBool::new(true);
        let mut last = 0;
        let plain = decompress_image(&path, &running, |n| last = n).unwrap();

        assert_eq!(last, 10_000);
        assert_eq!(std::fs::read(&plain).unwrap(), payload);
    }

    #[test]
    fn raw_image_is_used_in_place() {
        let running = AtomicBool::new(true);
        let plain = decompress_image(Path::new("/tmp/raw.img"), &running, |_| {}).unwrap();
        assert_eq!(plain.as_ref(), Path::new("/tmp/raw.img"));
    }
}
