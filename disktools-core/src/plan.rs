//! Computes the byte range a transfer covers.
//!
//! Offsets arrive as 512-byte sector counts and are validated against the
//! device length before anything is opened for writing.
use crate::device::SECTOR_SIZE;
use crate::error::{Error, Result, Warning};
use tracing::warn;

/// The portion of a device a transfer reads from or writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub device_length: u64,
    /// Byte offset from the start of the device.
    pub start_offset: u64,
    /// Planned number of bytes. Zero means "until the source is exhausted".
    pub length: u64,
    /// Explicit byte ceiling requested by the caller, if any.
    pub limit: Option<u64>,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.start_offset.saturating_add(self.length)
    }
}

fn sectors_to_bytes(offset_sectors: u64, device_length: u64, max_bytes: u64) -> Result<u64> {
    offset_sectors
        .checked_mul(SECTOR_SIZE)
        .ok_or(Error::RangeInvalid {
            offset: u64::MAX,
            length: max_bytes,
            device_length,
        })
}

/// Plans a range in bytes.
///
/// With `max_bytes > 0` the range is exactly `max_bytes` long and must end
/// within the device. With `max_bytes == 0` it runs from `offset` to the end
/// of the device.
pub fn plan_bytes(device_length: u64, offset: u64, max_bytes: u64) -> Result<ByteRange> {
    let invalid = || Error::RangeInvalid {
        offset,
        length: max_bytes,
        device_length,
    };

    if offset > device_length {
        return Err(invalid());
    }

    if max_bytes > 0 {
        let end = offset.checked_add(max_bytes).ok_or_else(invalid)?;
        if end > device_length {
            return Err(invalid());
        }
        return Ok(ByteRange {
            device_length,
            start_offset: offset,
            length: max_bytes,
            limit: Some(max_bytes),
        });
    }

    Ok(ByteRange {
        device_length,
        start_offset: offset,
        length: device_length - offset,
        limit: None,
    })
}

/// Plans a transfer whose data comes from the device or a synthetic source
/// (dump, zero fill).
pub fn plan(device_length: u64, offset_sectors: u64, max_bytes: u64) -> Result<ByteRange> {
    let offset = sectors_to_bytes(offset_sectors, device_length, max_bytes)?;
    plan_bytes(device_length, offset, max_bytes)
}

/// Plans a file→device transfer.
///
/// Without an explicit maximum the planned length is the file's size. If that
/// runs past the end of the device a [`Warning::ExceedsDevice`] is returned
/// alongside the plan and the transfer is still allowed to proceed; the write
/// at the device boundary is what eventually fails. An explicit maximum is
/// validated strictly, as in [`plan`].
pub fn plan_from_file(
    device_length: u64,
    offset_sectors: u64,
    max_bytes: u64,
    file_length: u64,
) -> Result<(ByteRange, Option<Warning>)> {
    let offset = sectors_to_bytes(offset_sectors, device_length, max_bytes)?;

    if max_bytes > 0 {
        return Ok((plan_bytes(device_length, offset, max_bytes)?, None));
    }

    if offset > device_length {
        return Err(Error::RangeInvalid {
            offset,
            length: file_length,
            device_length,
        });
    }

    let range = ByteRange {
        device_length,
        start_offset: offset,
        length: file_length,
        limit: None,
    };

    let warning = (range.end() > device_length).then(|| {
        let warning = Warning::ExceedsDevice {
            file_length,
            offset,
            device_length,
        };
        warn!("{warning}");
        warning
    });

    Ok((range, warning))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn whole_device_without_maximum() {
        let range = plan(MIB, 0, 0).unwrap();
        assert_eq!(range.start_offset, 0);
        assert_eq!(range.length, MIB);
        assert_eq!(range.limit, None);
        assert_eq!(range.end(), MIB);
    }

    #[test]
    fn offset_is_counted_in_sectors() {
        let range = plan(MIB, 8, 0).unwrap();
        assert_eq!(range.start_offset, 4096);
        assert_eq!(range.length, MIB - 4096);
    }

    #[test]
    fn explicit_maximum_sets_ceiling() {
        let range = plan(MIB, 2, 70_000).unwrap();
        assert_eq!(range.start_offset, 1024);
        assert_eq!(range.length, 70_000);
        assert_eq!(range.limit, Some(70_000));
    }

    #[test]
    fn maximum_past_device_end_is_rejected() {
        let err = plan(MIB, 512, 2_000_000).unwrap_err();
        assert!(matches!(
            err,
            Error::RangeInvalid {
                device_length: MIB,
                ..
            }
        ));
    }

    #[test]
    fn offset_past_device_end_is_rejected() {
        assert!(plan(MIB, MIB / 512 + 1, 0).is_err());
        assert!(plan(MIB, u64::MAX, 0).is_err());
    }

    #[test]
    fn valid_ranges_never_exceed_device() {
        let device_length = 10 * 4096 + 512;
        for offset in (0..=device_length).step_by(512) {
            for max in [1, 511, 512, 4096, 65_536] {
                match plan_bytes(device_length, offset, max) {
                    Ok(range) => {
                        assert!(offset + max <= device_length);
                        assert!(range.end() <= device_length);
                    }
                    Err(Error::RangeInvalid { .. }) => {
                        assert!(offset + max > device_length);
                    }
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
    }

    #[test]
    fn oversized_file_warns_but_plans() {
        let (range, warning) = plan_from_file(MIB, 1, 0, MIB).unwrap();
        assert_eq!(range.length, MIB);
        assert_eq!(
            warning,
            Some(Warning::ExceedsDevice {
                file_length: MIB,
                offset: 512,
                device_length: MIB,
            })
        );
    }

    #[test]
    fn fitting_file_has_no_warning() {
        let (range, warning) = plan_from_file(MIB, 0, 0, 4096).unwrap();
        assert_eq!(range.length, 4096);
        assert_eq!(range.limit, None);
        assert!(warning.is_none());
    }

    #[test]
    fn file_with_bad_maximum_is_rejected() {
        assert!(plan_from_file(MIB, 0, MIB + 1, 10).is_err());
    }
}
