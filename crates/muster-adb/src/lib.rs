//! Muster ADB - transport adapter over the adb CLI
//!
//! This crate implements the engine's `Transport` trait by driving the adb
//! binary. The wire protocol stays inside adb; this adapter only issues
//! connect/disconnect/devices/shell invocations and parses their output.

pub mod parse;
pub mod tracker;
pub mod transport;

pub use tracker::spawn_tracker;
pub use transport::{AdbConfig, AdbTransport};
