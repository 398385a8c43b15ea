//! Shared vocabulary for the slotwarden lock manager.
//!
//! This crate holds the slot record, the validated value types it is built
//! from, workspace-wide constants, and the error taxonomy every other crate
//! converts into.

pub mod constants;
pub mod error;
pub mod slot;
pub mod types;

pub use error::{Error, Result};
pub use slot::{LastAccess, Slot};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
