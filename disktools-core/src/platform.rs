//! Provides platform-specific functionality.
//!
//! This module contains the raw device primitives the engine is built on:
//! length and geometry queries, descriptor probing, volume locking, layout
//! deletion, media ejection and device discovery.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the correct implementation
//! for the target OS (e.g., Linux, Windows). Each submodule exposes the same
//! public API, so that the rest of the library can use it without worrying
//! about the underlying platform. All primitives operate on an already-open
//! [`std::fs::File`] and report failures as plain [`std::io::Error`]s; the
//! engine decides which of them are fatal.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::*;
