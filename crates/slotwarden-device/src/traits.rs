//! Lock device trait definition.
//!
//! This module defines the contract between the reconciliation engine and a
//! physical lock. A transport (Z-Wave, BLE, a vendor cloud) implements
//! [`LockDevice`]; the engine only ever sees actual slot states, write/clear
//! acknowledgements, and the asynchronous event feed.
//!
//! Methods return `impl Future + Send` rather than using bare `async fn` so a
//! generic engine holding `D: LockDevice` can move device calls into spawned
//! Tokio tasks. Implementations are still written with `async fn`.

use std::future::Future;

use slotwarden_core::SlotId;

use crate::error::Result;
use crate::types::{DeviceInfo, DeviceSlot, DeviceSlotStatus, LockEvent};

/// Lock device abstraction.
///
/// # Object Safety
///
/// This trait is not object-safe because its methods return
/// `impl Future`. The engine takes the device as a type parameter:
///
/// ```no_run
/// use slotwarden_device::mock::MockLock;
/// use slotwarden_device::traits::LockDevice;
///
/// async fn occupied<D: LockDevice>(device: &D) -> slotwarden_device::Result<usize> {
///     let slots = device.read_all_slots().await?;
///     Ok(slots.iter().filter(|slot| slot.is_occupied()).count())
/// }
///
/// # async fn example() -> slotwarden_device::Result<()> {
/// let (lock, _handle) = MockLock::new(20);
/// assert_eq!(occupied(&lock).await?, 0);
/// # Ok(())
/// # }
/// ```
///
/// # Concurrency
///
/// All methods take `&self`; implementations serialize access to the
/// transport internally so slot-independent operations may run in parallel.
pub trait LockDevice: Send + Sync {
    /// Read the actual state of every user-code slot.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The device is disconnected
    /// - The device reports malformed data
    fn read_all_slots(&self) -> impl Future<Output = Result<Vec<DeviceSlot>>> + Send;

    /// Read the actual state of a single slot.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::SlotOutOfRange` if the lock has no such slot.
    fn read_slot(&self, id: SlotId) -> impl Future<Output = Result<DeviceSlot>> + Send;

    /// Write a code with the given status into a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The lock rejects the code
    /// - A communication error occurs
    fn write_slot(
        &self,
        id: SlotId,
        code: &str,
        status: DeviceSlotStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear a slot, leaving it available.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock rejects the operation or is unreachable.
    fn clear_slot(&self, id: SlotId) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next event pushed by the lock.
    ///
    /// Events are yielded in the order the lock reported them.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Disconnected` once the feed is closed.
    fn next_event(&self) -> impl Future<Output = Result<LockEvent>> + Send;

    /// Get device information.
    fn get_info(&self) -> impl Future<Output = Result<DeviceInfo>> + Send;
}
