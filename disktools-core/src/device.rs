use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;

/// Fixed sector size used for offset arithmetic.
pub const SECTOR_SIZE: u64 = 512;

const PHYSICAL_DRIVE_PREFIX: &str = r"\\.\PhysicalDrive";

/// Represents a block device discovered on the system.
///
/// Populated by [`crate::platform::list_devices`] for display purposes only;
/// the transfer engine itself works from an opened [`crate::handle::DeviceHandle`].
#[derive(Clone, Debug)]
pub struct Device {
    /// The system path to the device (e.g., `/dev/sda` or `\\.\PhysicalDrive0`).
    pub path: PathBuf,
    /// The kernel-provided name of the device (e.g., "sda" or "PhysicalDrive0").
    pub name: String,
    /// The total size of the device in bytes.
    pub size: u64,
    /// Identification data, when the driver exposed it.
    pub descriptor: Option<DeviceDescriptor>,
    /// The primary mount point of the device, if any.
    pub mount_point: String,
    /// Whether this device holds the running operating system.
    pub is_system: bool,
}

impl Device {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.is_system {
            "[System disk]".to_string()
        } else if !self.mount_point.is_empty() {
            format!("[Mounted at {}]", self.mount_point)
        } else {
            "[Not mounted]".to_string()
        };

        let ident = match &self.descriptor {
            Some(d) => d.to_string(),
            None => "(n/a)".to_string(),
        };

        write!(
            f,
            "{:<22} {:>10.1} MB  {} {}",
            self.path.display(),
            self.size_mb(),
            ident,
            location
        )
    }
}

/// Storage bus a device is attached through, as reported by its driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusType {
    Unknown,
    Scsi,
    Atapi,
    Ata,
    Firewire,
    Ssa,
    FibreChannel,
    Usb,
    Raid,
    Iscsi,
    Sas,
    Sata,
    Sd,
    Mmc,
    Virtual,
    Vhd,
    Spaces,
    Nvme,
    Scm,
    Ufs,
    Other(u32),
}

impl From<u32> for BusType {
    fn from(raw: u32) -> Self {
        match raw {
            0 => BusType::Unknown,
            1 => BusType::Scsi,
            2 => BusType::Atapi,
            3 => BusType::Ata,
            4 => BusType::Firewire,
            5 => BusType::Ssa,
            6 => BusType::FibreChannel,
            7 => BusType::Usb,
            8 => BusType::Raid,
            9 => BusType::Iscsi,
            10 => BusType::Sas,
            11 => BusType::Sata,
            12 => BusType::Sd,
            13 => BusType::Mmc,
            14 => BusType::Virtual,
            15 => BusType::Vhd,
            16 => BusType::Spaces,
            17 => BusType::Nvme,
            18 => BusType::Scm,
            19 => BusType::Ufs,
            other => BusType::Other(other),
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusType::Unknown => "UNKNOWN",
            BusType::Scsi => "SCSI",
            BusType::Atapi => "ATAPI",
            BusType::Ata => "ATA",
            BusType::Firewire => "1394",
            BusType::Ssa => "SSA",
            BusType::FibreChannel => "FC",
            BusType::Usb => "USB",
            BusType::Raid => "RAID",
            BusType::Iscsi => "ISCSI",
            BusType::Sas => "SAS",
            BusType::Sata => "SATA",
            BusType::Sd => "SD",
            BusType::Mmc => "MMC",
            BusType::Virtual => "VIRTUAL",
            BusType::Vhd => "VHD",
            BusType::Spaces => "SPACES",
            BusType::Nvme => "NVME",
            BusType::Scm => "SCM",
            BusType::Ufs => "UFS",
            BusType::Other(_) => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Vendor-supplied identification metadata for a device.
///
/// Informational only: nothing in the engine branches on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub removable: bool,
    pub bus_type: BusType,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub product_revision: Option<String>,
}

// STORAGE_DEVICE_DESCRIPTOR field offsets.
const DESC_REMOVABLE: usize = 10;
const DESC_VENDOR_OFFSET: usize = 12;
const DESC_PRODUCT_OFFSET: usize = 16;
const DESC_REVISION_OFFSET: usize = 20;
const DESC_BUS_TYPE: usize = 28;
/// Size of the fixed part of a STORAGE_DEVICE_DESCRIPTOR.
pub const STORAGE_DEVICE_DESCRIPTOR_LEN: usize = 40;
/// Size of a STORAGE_DESCRIPTOR_HEADER (Version, Size).
pub const STORAGE_DESCRIPTOR_HEADER_LEN: usize = 8;

impl DeviceDescriptor {
    /// Decodes a raw `STORAGE_DEVICE_DESCRIPTOR` payload.
    ///
    /// The string fields are stored after the fixed header and addressed by
    /// byte offsets from the start of the buffer; an offset of zero means the
    /// driver did not supply that string. Returns `None` if the buffer is too
    /// short to hold the fixed part.
    pub fn from_storage_descriptor(buf: &[u8]) -> Option<Self> {
        if buf.len() < STORAGE_DEVICE_DESCRIPTOR_LEN {
            return None;
        }

        Some(Self {
            removable: buf[DESC_REMOVABLE] != 0,
            bus_type: BusType::from(read_u32(buf, DESC_BUS_TYPE)?),
            vendor_id: string_at_offset(buf, read_u32(buf, DESC_VENDOR_OFFSET)?),
            product_id: string_at_offset(buf, read_u32(buf, DESC_PRODUCT_OFFSET)?),
            product_revision: string_at_offset(buf, read_u32(buf, DESC_REVISION_OFFSET)?),
        })
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            if self.removable {
                "Removable"
            } else {
                "Non-Removable"
            },
            self.bus_type,
            self.vendor_id.as_deref().unwrap_or("n/a"),
            self.product_id.as_deref().unwrap_or("n/a"),
        )
    }
}

/// Reads a little-endian `u32` at `at`. Descriptor payloads are always
/// produced by the local (little-endian) Windows kernel.
pub(crate) fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Extracts a NUL-terminated, space-padded ASCII string at `offset`.
fn string_at_offset(buf: &[u8], offset: u32) -> Option<String> {
    let start = offset as usize;
    if start == 0 || start >= buf.len() {
        return None;
    }
    let end = buf[start..]
        .iter()
        .position(|&b| b == 0)
        .map_or(buf.len(), |p| start + p);
    let s = String::from_utf8_lossy(&buf[start..end]).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

/// CHS geometry of a drive, used when the direct length query is unsupported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskGeometry {
    pub cylinders: u64,
    pub tracks_per_cylinder: u32,
    pub sectors_per_track: u32,
    pub bytes_per_sector: u32,
}

impl DiskGeometry {
    /// Total addressable bytes. Saturates rather than wrapping on garbage input.
    pub fn total_bytes(&self) -> u64 {
        self.cylinders
            .saturating_mul(u64::from(self.tracks_per_cylinder))
            .saturating_mul(u64::from(self.sectors_per_track))
            .saturating_mul(u64::from(self.bytes_per_sector))
    }
}

/// Resolves a user-supplied device identifier to a platform device path.
///
/// Accepted forms:
/// - `\\.\PhysicalDriveN` (any case), passed through.
/// - A disk number such as `2`, mapped to `\\.\PhysicalDrive2`.
/// - A floppy drive letter `a` / `b` (optionally `a:`), mapped to `\\.\A:`.
/// - Any absolute path (`/dev/sdb`, `\\?\...`, an image file), passed through.
pub fn resolve_identifier(id: &str) -> Result<PathBuf> {
    let id = id.trim();

    let has_drive_prefix = id
        .get(..PHYSICAL_DRIVE_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(PHYSICAL_DRIVE_PREFIX));
    if has_drive_prefix {
        return Ok(PathBuf::from(id));
    }

    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        return Ok(PathBuf::from(format!("{PHYSICAL_DRIVE_PREFIX}{id}")));
    }

    let letter = id.strip_suffix(':').unwrap_or(id);
    if letter.len() == 1 {
        if let Some(c @ ('a' | 'b')) = letter.chars().next().map(|c| c.to_ascii_lowercase()) {
            return Ok(PathBuf::from(format!(
                r"\\.\{}:",
                c.to_ascii_uppercase()
            )));
        }
    }

    if id.starts_with('/') || id.starts_with(r"\\") || std::path::Path::new(id).is_absolute() {
        return Ok(PathBuf::from(id));
    }

    Err(Error::InvalidIdentifier(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_bytes(vendor: &str, product: &str, bus: u32, removable: bool) -> Vec<u8> {
        let mut buf = vec![0u8; STORAGE_DEVICE_DESCRIPTOR_LEN];
        buf[0..4].copy_from_slice(&(STORAGE_DEVICE_DESCRIPTOR_LEN as u32).to_le_bytes());
        buf[DESC_REMOVABLE] = removable as u8;
        buf[DESC_BUS_TYPE..DESC_BUS_TYPE + 4].copy_from_slice(&bus.to_le_bytes());

        let vendor_at = buf.len() as u32;
        buf.extend_from_slice(vendor.as_bytes());
        buf.push(0);
        let product_at = buf.len() as u32;
        buf.extend_from_slice(product.as_bytes());
        buf.push(0);

        buf[DESC_VENDOR_OFFSET..DESC_VENDOR_OFFSET + 4].copy_from_slice(&vendor_at.to_le_bytes());
        buf[DESC_PRODUCT_OFFSET..DESC_PRODUCT_OFFSET + 4]
            .copy_from_slice(&product_at.to_le_bytes());
        let size = buf.len() as u32;
        buf[4..8].copy_from_slice(&size.to_le_bytes());
        buf
    }

    #[test]
    fn decodes_usb_stick_descriptor() {
        let buf = descriptor_bytes("SanDisk ", "Cruzer Blade    ", 7, true);
        let desc = DeviceDescriptor::from_storage_descriptor(&buf).unwrap();

        assert!(desc.removable);
        assert_eq!(desc.bus_type, BusType::Usb);
        assert_eq!(desc.vendor_id.as_deref(), Some("SanDisk"));
        assert_eq!(desc.product_id.as_deref(), Some("Cruzer Blade"));
        assert_eq!(desc.product_revision, None);
        assert_eq!(desc.to_string(), "Removable USB SanDisk Cruzer Blade");
    }

    #[test]
    fn zero_offsets_mean_absent_strings() {
        let mut buf = vec![0u8; STORAGE_DEVICE_DESCRIPTOR_LEN];
        buf[DESC_BUS_TYPE] = 17;
        let desc = DeviceDescriptor::from_storage_descriptor(&buf).unwrap();

        assert!(!desc.removable);
        assert_eq!(desc.bus_type, BusType::Nvme);
        assert_eq!(desc.vendor_id, None);
        assert_eq!(desc.to_string(), "Non-Removable NVME n/a n/a");
    }

    #[test]
    fn out_of_range_offset_is_ignored() {
        let mut buf = descriptor_bytes("ATA", "ST1000", 11, false);
        buf[DESC_PRODUCT_OFFSET..DESC_PRODUCT_OFFSET + 4].copy_from_slice(&9999u32.to_le_bytes());
        let desc = DeviceDescriptor::from_storage_descriptor(&buf).unwrap();

        assert_eq!(desc.vendor_id.as_deref(), Some("ATA"));
        assert_eq!(desc.product_id, None);
    }

    #[test]
    fn truncated_descriptor_is_rejected() {
        assert!(DeviceDescriptor::from_storage_descriptor(&[0u8; 12]).is_none());
    }

    #[test]
    fn unknown_bus_values_are_preserved() {
        assert_eq!(BusType::from(42), BusType::Other(42));
        assert_eq!(BusType::from(42).to_string(), "UNKNOWN");
        assert_eq!(BusType::from(4).to_string(), "1394");
    }

    #[test]
    fn geometry_multiplies_all_dimensions() {
        let floppy = DiskGeometry {
            cylinders: 80,
            tracks_per_cylinder: 2,
            sectors_per_track: 18,
            bytes_per_sector: 512,
        };
        assert_eq!(floppy.total_bytes(), 1_474_560);
    }

    #[test]
    fn resolves_identifiers() {
        assert_eq!(
            resolve_identifier("3").unwrap(),
            PathBuf::from(r"\\.\PhysicalDrive3")
        );
        assert_eq!(
            resolve_identifier(r"\\.\physicaldrive12").unwrap(),
            PathBuf::from(r"\\.\physicaldrive12")
        );
        assert_eq!(resolve_identifier("a").unwrap(), PathBuf::from(r"\\.\A:"));
        assert_eq!(resolve_identifier("B:").unwrap(), PathBuf::from(r"\\.\B:"));
        assert_eq!(
            resolve_identifier("/dev/sdb").unwrap(),
            PathBuf::from("/dev/sdb")
        );
    }

    #[test]
    fn rejects_unknown_identifiers() {
        for bad in ["", "c", "disk1", "relative/path.img"] {
            assert!(matches!(
                resolve_identifier(bad),
                Err(Error::InvalidIdentifier(_))
            ));
        }
    }
}
