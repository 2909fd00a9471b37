//! msb - media source buffer engine tooling
//!
//! This library crate exposes the script replayer for integration testing.

pub mod replay;
