use crate::device::{BusType, Device, DeviceDescriptor, DiskGeometry, SECTOR_SIZE};
use nix::{ioctl_none, ioctl_none_bad, ioctl_read, ioctl_read_bad, request_code_none};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

ioctl_read!(blkgetsize64, 0x12, 114, u64);
ioctl_none!(blkrrpart, 0x12, 95);
ioctl_read_bad!(blksszget, request_code_none!(0x12, 104), libc::c_int);
ioctl_read_bad!(hdio_getgeo, 0x0301, HdGeometry);
ioctl_none_bad!(cdromeject, 0x5309);

/// `struct hd_geometry` from `<linux/hdreg.h>`.
#[repr(C)]
#[derive(Default)]
pub struct HdGeometry {
    heads: u8,
    sectors: u8,
    cylinders: u16,
    start: libc::c_ulong,
}

/// Sectors covered by the MBR, primary GPT header and its partition entries.
const PRIMARY_LAYOUT_SECTORS: u64 = 34;
/// Sectors covered by the backup GPT entries and header at the end of the disk.
const BACKUP_LAYOUT_SECTORS: u64 = 33;

fn is_block_device(file: &File) -> io::Result<bool> {
    Ok(file.metadata()?.file_type().is_block_device())
}

fn not_block_device() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "not a block device")
}

/// Extended DASD I/O is a Windows concept; reads past partition boundaries
/// need no special permission here.
pub fn enable_extended_io(_file: &File) -> io::Result<()> {
    Ok(())
}

/// Queries the byte length of a block device, or the size of a regular file.
pub fn query_length(file: &File) -> io::Result<u64> {
    if !is_block_device(file)? {
        return Ok(file.metadata()?.len());
    }

    let mut size_bytes: u64 = 0;
    unsafe {
        blkgetsize64(file.as_raw_fd(), &mut size_bytes)?;
    }
    Ok(size_bytes)
}

pub fn query_geometry(file: &File) -> io::Result<DiskGeometry> {
    if !is_block_device(file)? {
        return Err(not_block_device());
    }

    let fd = file.as_raw_fd();
    let mut geo = HdGeometry::default();
    let mut sector_size: libc::c_int = 0;
    unsafe {
        hdio_getgeo(fd, &mut geo)?;
        blksszget(fd, &mut sector_size)?;
    }

    Ok(DiskGeometry {
        cylinders: u64::from(geo.cylinders),
        tracks_per_cylinder: u32::from(geo.heads),
        sectors_per_track: u32::from(geo.sectors),
        bytes_per_sector: u32::try_from(sector_size).unwrap_or(0),
    })
}

/// Maps a `dev_t` to the sysfs directory describing it.
fn sysfs_dir(file: &File) -> io::Result<PathBuf> {
    let meta = file.metadata()?;
    if !meta.file_type().is_block_device() {
        return Err(not_block_device());
    }
    let dev = meta.rdev();
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    fs::canonicalize(format!("/sys/dev/block/{major}:{minor}"))
}

fn read_trimmed(path: &Path) -> Option<String> {
    let s = fs::read_to_string(path).ok()?.trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

fn bus_type_from_sysfs(dir: &Path) -> BusType {
    let path = dir.to_string_lossy();
    if path.contains("/usb") {
        BusType::Usb
    } else if path.contains("/nvme") {
        BusType::Nvme
    } else if path.contains("/mmc") {
        BusType::Mmc
    } else if path.contains("/ata") {
        BusType::Sata
    } else if path.contains("/virtio") {
        BusType::Virtual
    } else if path.contains("/target") {
        BusType::Scsi
    } else {
        BusType::Unknown
    }
}

pub fn query_descriptor(file: &File) -> io::Result<DeviceDescriptor> {
    let mut dir = sysfs_dir(file)?;
    // Partitions carry no identification of their own.
    if dir.join("partition").exists() {
        if let Some(parent) = dir.parent() {
            dir = parent.to_path_buf();
        }
    }

    let removable = fs::read_to_string(dir.join("removable"))?.trim() == "1";

    Ok(DeviceDescriptor {
        removable,
        bus_type: bus_type_from_sysfs(&dir),
        vendor_id: read_trimmed(&dir.join("device/vendor")),
        product_id: read_trimmed(&dir.join("device/model")),
        product_revision: read_trimmed(&dir.join("device/rev")),
    })
}

/// Takes an advisory exclusive lock. Fails immediately if another process
/// already holds one.
pub fn lock_volume(file: &File) -> io::Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn unlock_volume(file: &File) -> io::Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Destroys the partition table: zeroes the MBR and primary GPT region and
/// the backup GPT region, then asks the kernel to drop its partition view.
pub fn delete_layout(file: &File) -> io::Result<()> {
    let length = query_length(file)?;

    let primary = (PRIMARY_LAYOUT_SECTORS * SECTOR_SIZE).min(length);
    file.write_all_at(&vec![0u8; primary as usize], 0)?;

    let backup = BACKUP_LAYOUT_SECTORS * SECTOR_SIZE;
    if length >= primary + backup {
        file.write_all_at(&vec![0u8; backup as usize], length - backup)?;
    }
    file.sync_data()?;

    if let Err(e) = refresh_layout(file) {
        debug!("BLKRRPART after layout delete failed: {e}");
    }
    Ok(())
}

/// Re-reads the partition table of a block device. No-op for regular files.
pub fn refresh_layout(file: &File) -> io::Result<()> {
    if !is_block_device(file)? {
        return Ok(());
    }
    unsafe {
        blkrrpart(file.as_raw_fd())?;
    }
    Ok(())
}

pub fn eject_media(file: &File) -> io::Result<()> {
    if !is_block_device(file)? {
        return Err(not_block_device());
    }
    unsafe {
        cdromeject(file.as_raw_fd())?;
    }
    Ok(())
}

/// Helper to read a specific file from the /sys/block filesystem.
fn read_sys_file(device_name: &str, file: &str) -> io::Result<String> {
    let path = PathBuf::from("/sys/block").join(device_name).join(file);
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Helper to find the parent device of a partition (e.g., /dev/sda1 -> /dev/sda).
fn get_parent_device_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str.starts_with("/dev/sd") || path_str.starts_with("/dev/vd") {
        if let Some(index) = path_str.rfind(|c: char| c.is_alphabetic()) {
            return PathBuf::from(&path_str[..=index]);
        }
    } else if path_str.starts_with("/dev/mmcblk") || path_str.starts_with("/dev/nvme") {
        if let Some(index) = path_str.rfind('p') {
            return PathBuf::from(&path_str[..index]);
        }
    }

    path.to_path_buf()
}

/// Scans `/sys/block` for disks.
///
/// Loop and RAM devices are skipped, as are devices reporting a size of zero
/// (usually empty card readers). The disk holding `/` is flagged with
/// [`Device::is_system`] rather than hidden, so that the listing matches the
/// numbering tools like `lsblk` show.
pub fn list_devices() -> io::Result<Vec<Device>> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let system_disk_parent = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .map(|disk| get_parent_device_path(&PathBuf::from("/dev/").join(disk.name())));

    let mut devices = Vec::new();
    for entry in fs::read_dir("/sys/block")?.filter_map(Result::ok) {
        let device_name = entry.file_name().to_string_lossy().to_string();
        if device_name.starts_with("loop") || device_name.starts_with("ram") {
            continue;
        }
        let device_path = PathBuf::from("/dev/").join(&device_name);

        let size_sectors = read_sys_file(&device_name, "size")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        if size_sectors == 0 {
            continue;
        }

        let removable = read_sys_file(&device_name, "removable")
            .map(|s| s == "1")
            .unwrap_or(false);
        let sys_dir = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path());
        let descriptor = DeviceDescriptor {
            removable,
            bus_type: bus_type_from_sysfs(&sys_dir),
            vendor_id: read_sys_file(&device_name, "device/vendor")
                .ok()
                .filter(|s| !s.is_empty()),
            product_id: read_sys_file(&device_name, "device/model")
                .ok()
                .filter(|s| !s.is_empty()),
            product_revision: read_sys_file(&device_name, "device/rev")
                .ok()
                .filter(|s| !s.is_empty()),
        };

        let mount_point = disks
            .iter()
            .filter(|disk| disk.name().to_string_lossy().starts_with(&device_name))
            .map(|disk| disk.mount_point().to_string_lossy().to_string())
            .find(|mp| !mp.is_empty())
            .unwrap_or_default();

        devices.push(Device {
            is_system: system_disk_parent.as_deref() == Some(device_path.as_path()),
            path: device_path,
            name: device_name,
            size: size_sectors * SECTOR_SIZE,
            descriptor: Some(descriptor),
            mount_point,
        });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn regular_file_length_is_its_size() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[7u8; 3000]).unwrap();
        assert_eq!(query_length(&file).unwrap(), 3000);
    }

    #[test]
    fn regular_file_has_no_geometry_or_descriptor() {
        let file = tempfile::tempfile().unwrap();
        assert_eq!(
            query_geometry(&file).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
        assert!(query_descriptor(&file).is_err());
    }

    #[test]
    fn second_lock_on_same_file_fails() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let first = File::open(tmp.path()).unwrap();
        let second = File::open(tmp.path()).unwrap();

        lock_volume(&first).unwrap();
        assert!(lock_volume(&second).is_err());
        unlock_volume(&first).unwrap();
        lock_volume(&second).unwrap();
    }

    #[test]
    fn parent_of_partition_paths() {
        assert_eq!(
            get_parent_device_path(Path::new("/dev/sda1")),
            PathBuf::from("/dev/sda")
        );
        assert_eq!(
            get_parent_device_path(Path::new("/dev/nvme0n1p2")),
            PathBuf::from("/dev/nvme0n1")
        );
        assert_eq!(
            get_parent_device_path(Path::new("/dev/mmcblk0p1")),
            PathBuf::from("/dev/mmcblk0")
        );
    }

    #[test]
    fn bus_type_follows_sysfs_path() {
        assert_eq!(
            bus_type_from_sysfs(Path::new(
                "/sys/devices/pci0000:00/0000:00:14.0/usb2/2-1/2-1:1.0/host6/target6:0:0/6:0:0:0/block/sdb"
            )),
            BusType::Usb
        );
        assert_eq!(
            bus_type_from_sysfs(Path::new(
                "/sys/devices/pci0000:00/0000:00:1d.0/nvme/nvme0/nvme0n1"
            )),
            BusType::Nvme
        );
        assert_eq!(
            bus_type_from_sysfs(Path::new("/sys/devices/virtual/block/dm-0")),
            BusType::Unknown
        );
    }
}
