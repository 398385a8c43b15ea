//! Mock device implementations for testing and development.
//!
//! This module provides a simulated lock that can be controlled
//! programmatically without requiring a Z-Wave network or physical hardware.

pub mod lock;

pub use lock::{MockLock, MockLockHandle};
