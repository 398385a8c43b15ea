//! Lock device abstraction for slotwarden.
//!
//! This crate defines how the reconciliation engine talks to a lock's
//! user-code table: reading actual slot states, writing and clearing codes,
//! and receiving the events the lock pushes (code used, bolt state changed).
//!
//! # Design Philosophy
//!
//! - **Async-first**: every operation is asynchronous; implementations use
//!   native `async fn` in traits (Edition 2024 RPITIT).
//! - **Spawnable**: trait futures are `Send`, so engines generic over a
//!   device can run calls in Tokio tasks.
//! - **Bounded**: the engine wraps each call with [`timeout::with_timeout`];
//!   a lock that stops answering becomes a `Timeout` error.
//!
//! # Example
//!
//! ```no_run
//! use slotwarden_core::SlotId;
//! use slotwarden_device::traits::LockDevice;
//! use slotwarden_device::types::DeviceSlotStatus;
//! use slotwarden_device::Result;
//!
//! async fn install<D: LockDevice>(lock: &D, slot: SlotId, pin: &str) -> Result<bool> {
//!     lock.write_slot(slot, pin, DeviceSlotStatus::Enabled).await?;
//!     let actual = lock.read_slot(slot).await?;
//!     Ok(actual.code.as_deref() == Some(pin))
//! }
//! ```
//!
//! # Alarm Mapping
//!
//! Locks report activity as alarm type/level pairs. [`LockEvent::from_alarm`]
//! turns the ones the engine cares about into typed events and drops the
//! rest.

pub mod error;
pub mod mock;
pub mod timeout;
pub mod traits;
pub mod types;

pub use error::{DeviceError, Result};
pub use traits::LockDevice;
pub use types::{AccessEvent, DeviceInfo, DeviceSlot, DeviceSlotStatus, LockEvent};
