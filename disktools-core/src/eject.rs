//! Ejects removable media.
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::platform;
use std::path::Path;
use tracing::info;

pub fn run(device_path: &Path) -> Result<()> {
    let device = DeviceHandle::open_read(device_path)?;
    platform::eject_media(device.file()).map_err(|source| Error::EjectFailed {
        path: device_path.to_path_buf(),
        source,
    })?;
    info!(path = %device_path.display(), "media ejected");
    Ok(())
}
