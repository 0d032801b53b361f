use crate::device::{
    Device, DeviceDescriptor, DiskGeometry, STORAGE_DESCRIPTOR_HEADER_LEN,
    STORAGE_DEVICE_DESCRIPTOR_LEN, read_u32,
};
use crate::os_options::device_open_options;
use std::fs::File;
use std::io;
use std::os::windows::io::AsRawHandle;
use std::path::PathBuf;
use std::ptr;
use tracing::debug;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::IO::DeviceIoControl;
use windows_sys::Win32::System::Ioctl::{
    FSCTL_ALLOW_EXTENDED_DASD_IO, FSCTL_LOCK_VOLUME, FSCTL_UNLOCK_VOLUME,
    IOCTL_DISK_DELETE_DRIVE_LAYOUT, IOCTL_DISK_GET_DRIVE_GEOMETRY, IOCTL_DISK_GET_LENGTH_INFO,
    IOCTL_DISK_UPDATE_PROPERTIES, IOCTL_STORAGE_EJECT_MEDIA, IOCTL_STORAGE_QUERY_PROPERTY,
};

/// Physical drive numbers probed by [`list_devices`].
const MAX_PHYSICAL_DRIVES: u32 = 32;

/// Issues a buffered `DeviceIoControl` and returns the number of bytes the
/// driver wrote into `output`.
fn ioctl(file: &File, code: u32, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as HANDLE,
            code,
            if input.is_empty() {
                ptr::null()
            } else {
                input.as_ptr().cast()
            },
            input.len() as u32,
            if output.is_empty() {
                ptr::null_mut()
            } else {
                output.as_mut_ptr().cast()
            },
            output.len() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(returned as usize)
}

fn short_reply(what: &str, got: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{what} returned only {got} bytes"),
    )
}

/// Lets reads and writes cross the end of the last partition. Required on
/// some media (floppies) to reach the whole device.
pub fn enable_extended_io(file: &File) -> io::Result<()> {
    ioctl(file, FSCTL_ALLOW_EXTENDED_DASD_IO, &[], &mut []).map(|_| ())
}

pub fn query_length(file: &File) -> io::Result<u64> {
    // GET_LENGTH_INFORMATION { LARGE_INTEGER Length; }
    let mut buf = [0u8; 8];
    let got = ioctl(file, IOCTL_DISK_GET_LENGTH_INFO, &[], &mut buf)?;
    if got < buf.len() {
        return Err(short_reply("IOCTL_DISK_GET_LENGTH_INFO", got));
    }
    Ok(i64::from_le_bytes(buf).max(0) as u64)
}

pub fn query_geometry(file: &File) -> io::Result<DiskGeometry> {
    // DISK_GEOMETRY { Cylinders: i64, MediaType: u32, TracksPerCylinder: u32,
    //                 SectorsPerTrack: u32, BytesPerSector: u32 }
    let mut buf = [0u8; 24];
    let got = ioctl(file, IOCTL_DISK_GET_DRIVE_GEOMETRY, &[], &mut buf)?;
    if got < buf.len() {
        return Err(short_reply("IOCTL_DISK_GET_DRIVE_GEOMETRY", got));
    }
    let field = |at| read_u32(&buf, at).unwrap_or(0);
    let mut cylinders = [0u8; 8];
    cylinders.copy_from_slice(&buf[0..8]);

    Ok(DiskGeometry {
        cylinders: i64::from_le_bytes(cylinders).max(0) as u64,
        tracks_per_cylinder: field(12),
        sectors_per_track: field(16),
        bytes_per_sector: field(20),
    })
}

/// Two-phase `IOCTL_STORAGE_QUERY_PROPERTY`: the header reports how large the
/// full descriptor is, then the full payload is fetched into a buffer of that
/// size.
pub fn query_descriptor(file: &File) -> io::Result<DeviceDescriptor> {
    // STORAGE_PROPERTY_QUERY: PropertyId=StorageDeviceProperty, QueryType=PropertyStandardQuery
    let query = [0u8; 12];

    let mut header = [0u8; STORAGE_DESCRIPTOR_HEADER_LEN];
    let got = ioctl(file, IOCTL_STORAGE_QUERY_PROPERTY, &query, &mut header)?;
    if got < header.len() {
        return Err(short_reply("IOCTL_STORAGE_QUERY_PROPERTY header", got));
    }
    let size = read_u32(&header, 4).unwrap_or(0) as usize;
    debug!("storage descriptor reports {size} bytes");

    let mut payload = vec![0u8; size.max(STORAGE_DEVICE_DESCRIPTOR_LEN)];
    let got = ioctl(file, IOCTL_STORAGE_QUERY_PROPERTY, &query, &mut payload)?;
    payload.truncate(got);

    DeviceDescriptor::from_storage_descriptor(&payload)
        .ok_or_else(|| short_reply("IOCTL_STORAGE_QUERY_PROPERTY", got))
}

pub fn lock_volume(file: &File) -> io::Result<()> {
    ioctl(file, FSCTL_LOCK_VOLUME, &[], &mut []).map(|_| ())
}

pub fn unlock_volume(file: &File) -> io::Result<()> {
    ioctl(file, FSCTL_UNLOCK_VOLUME, &[], &mut []).map(|_| ())
}

pub fn delete_layout(file: &File) -> io::Result<()> {
    ioctl(file, IOCTL_DISK_DELETE_DRIVE_LAYOUT, &[], &mut []).map(|_| ())
}

pub fn refresh_layout(file: &File) -> io::Result<()> {
    ioctl(file, IOCTL_DISK_UPDATE_PROPERTIES, &[], &mut []).map(|_| ())
}

pub fn eject_media(file: &File) -> io::Result<()> {
    ioctl(file, IOCTL_STORAGE_EJECT_MEDIA, &[], &mut []).map(|_| ())
}

/// Probes `\\.\PhysicalDrive0` through `\\.\PhysicalDrive31`.
///
/// Drives that cannot be opened (absent, or access denied without elevation)
/// are skipped. The length query falls back to geometry the same way the
/// inspector does.
pub fn list_devices() -> io::Result<Vec<Device>> {
    let mut devices = Vec::new();

    for index in 0..MAX_PHYSICAL_DRIVES {
        let path = PathBuf::from(format!(r"\\.\PhysicalDrive{index}"));
        let file = match device_open_options(false).open(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!("skipping {}: {e}", path.display());
                continue;
            }
        };

        let size = query_length(&file)
            .or_else(|_| query_geometry(&file).map(|g| g.total_bytes()))
            .unwrap_or(0);
        if size == 0 {
            continue;
        }

        devices.push(Device {
            name: format!("PhysicalDrive{index}"),
            path,
            size,
            descriptor: query_descriptor(&file).ok(),
            mount_point: String::new(),
            is_system: false,
        });
    }

    Ok(devices)
}
