//! The core, UI-agnostic library for the `disktools` raw device utilities.
//!
//! `disktools-core` is designed to be used as a library by any front-end. It
//! handles opening raw block devices, measuring them (with a geometry-based
//! fallback), decoding their descriptors, planning byte ranges, and streaming
//! blocks between devices and files.
//!
//! The library is structured into several key modules:
//! - [`handle`]: The owned [`handle::DeviceHandle`] for an open device.
//! - [`inspect`]: Device length and descriptor queries.
//! - [`plan`]: Validation of offsets and lengths against the device length.
//! - [`copy`]: The [`copy::StreamCopier`] block loop used by every direction.
//! - [`erase`]: Confirmation-gated deletion of the drive layout.
//! - [`progress`]: Human-readable progress lines.
//! - [`platform`]: OS-specific primitives (Linux, Windows).
//!
//! The entry points for each utility are [`dump::run`], [`restore::run`],
//! [`clean::run`], [`clean::zero`] and [`eject::run`]. They block until the
//! operation completes and report progress via callbacks, allowing the
//! calling application to display progress in any way it chooses.
//!
//! ## Example: Dumping a Disk with Progress Reporting
//!
//! ```rust,no_run
//! use disktools_core::{copy::TransferOptions, device, dump};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::AtomicBool};
//!
//! fn main() -> disktools_core::error::Result<()> {
//!     let device_path = device::resolve_identifier("1")?;
//!
//!     // A shared flag to allow for graceful cancellation.
//!     let running = Arc::new(AtomicBool::new(true));
//!
//!     let report = dump::run(
//!         &device_path,
//!         Path::new("disk1.img"),
//!         0, // sectors to skip
//!         0, // copy to the end of the device
//!         TransferOptions::default(),
//!         running,
//!         |info| println!("Disk {}", info.device),
//!         |sample| println!("{sample}"),
//!     )?;
//!
//!     for warning in &report.warnings {
//!         println!("WARNING: {warning}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod clean;
pub mod copy;
pub mod device;
pub mod dump;
pub mod eject;
pub mod erase;
pub mod error;
pub mod handle;
pub mod inspect;
mod os_options;
pub mod plan;
pub mod platform;
pub mod progress;
pub mod restore;
pub mod session;
