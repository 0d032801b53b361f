//! Error and warning types shared by every disktools operation.
//!
//! Fatal conditions are returned as [`Error`]. Conditions that do not indicate
//! data corruption are recorded as [`Warning`]s in the operation's report and
//! never abort the session.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid device identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Cannot open {}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to obtain length of {}: {reason}", path.display())]
    DeviceQueryFailed { path: PathBuf, reason: String },

    #[error(
        "Range of {length} bytes at offset {offset} exceeds device length of {device_length} bytes"
    )]
    RangeInvalid {
        offset: u64,
        length: u64,
        device_length: u64,
    },

    #[error("Unable to lock volume {}", path.display())]
    VolumeLockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error after {transferred} bytes while {stage}")]
    TransferIo {
        stage: &'static str,
        transferred: u64,
        #[source]
        source: io::Error,
    },

    #[error("Unable to delete drive layout of {}", path.display())]
    LayoutClearFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to open file {}", path.display())]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to seek {} to offset {offset}", path.display())]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Unable to eject media in {}", path.display())]
    EjectFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Operation was not confirmed")]
    NotConfirmed,

    #[error("Operation cancelled by user")]
    Cancelled,
}

/// A non-fatal condition observed during a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    #[error("Device descriptor unavailable: {0}")]
    DescriptorUnavailable(String),

    #[error("Extended I/O could not be enabled: {0}")]
    ExtendedIoUnavailable(String),

    #[error(
        "File size + offset is larger than disk size! {file_length} + {offset} > {device_length}"
    )]
    ExceedsDevice {
        file_length: u64,
        offset: u64,
        device_length: u64,
    },

    #[error(
        "Expected {expected} bytes, transferred {actual} bytes, difference is {} bytes",
        expected.abs_diff(*actual)
    )]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Unable to unlock volume: {0}")]
    UnlockFailed(String),

    #[error("Unable to refresh disk properties: {0}")]
    RefreshFailed(String),
}
