//! Mock lock implementation for testing and development.
//!
//! The mock keeps an in-memory user-code table and an event channel. Tests
//! drive it through a [`MockLockHandle`]: editing codes "at the keypad",
//! injecting failures or latency, and pushing lock events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use slotwarden_core::{AccessMethod, SlotId};
use tokio::sync::mpsc;

use crate::error::{DeviceError, Result};
use crate::traits::LockDevice;
use crate::types::{AccessEvent, DeviceInfo, DeviceSlot, DeviceSlotStatus, LockEvent};

#[derive(Debug)]
struct MockState {
    slots: Vec<DeviceSlot>,
    latency: Duration,
    fail_next: Option<DeviceError>,
    writes: usize,
}

impl MockState {
    fn slot_mut(&mut self, id: SlotId) -> Result<&mut DeviceSlot> {
        let index = usize::from(id.as_u16());
        if index == 0 {
            return Err(DeviceError::SlotOutOfRange { slot: 0 });
        }
        self.slots
            .get_mut(index - 1)
            .ok_or(DeviceError::SlotOutOfRange { slot: id.as_u16() })
    }
}

fn lock_state(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock lock device for testing and development.
///
/// # Examples
///
/// ```
/// use slotwarden_core::SlotId;
/// use slotwarden_device::mock::MockLock;
/// use slotwarden_device::traits::LockDevice;
/// use slotwarden_device::types::DeviceSlotStatus;
///
/// #[tokio::main]
/// async fn main() -> slotwarden_device::Result<()> {
///     let (lock, handle) = MockLock::new(20);
///
///     lock.write_slot(SlotId::new(2), "4821", DeviceSlotStatus::Enabled).await?;
///     assert_eq!(handle.slot(SlotId::new(2)).unwrap().code.as_deref(), Some("4821"));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockLock {
    name: String,
    state: Arc<Mutex<MockState>>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<LockEvent>>,
}

impl MockLock {
    /// Create a mock lock with `slot_count` empty slots.
    pub fn new(slot_count: u16) -> (Self, MockLockHandle) {
        Self::with_name("Mock Lock", slot_count)
    }

    /// Create a mock lock with a custom name.
    pub fn with_name(name: impl Into<String>, slot_count: u16) -> (Self, MockLockHandle) {
        let name = name.into();
        let (events_tx, events_rx) = mpsc::channel(32);
        let state = Arc::new(Mutex::new(MockState {
            slots: (1..=slot_count)
                .map(|id| DeviceSlot::available(SlotId::new(id)))
                .collect(),
            latency: Duration::ZERO,
            fail_next: None,
            writes: 0,
        }));

        let lock = Self {
            name,
            state: Arc::clone(&state),
            events_rx: tokio::sync::Mutex::new(events_rx),
        };

        let handle = MockLockHandle { state, events_tx };

        (lock, handle)
    }

    /// Simulate transport latency and consume an injected failure.
    async fn round_trip(&self) -> Result<()> {
        let (latency, failure) = {
            let mut state = lock_state(&self.state);
            (state.latency, state.fail_next.take())
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl LockDevice for MockLock {
    async fn read_all_slots(&self) -> Result<Vec<DeviceSlot>> {
        self.round_trip().await?;
        Ok(lock_state(&self.state).slots.clone())
    }

    async fn read_slot(&self, id: SlotId) -> Result<DeviceSlot> {
        self.round_trip().await?;
        lock_state(&self.state).slot_mut(id).map(|slot| slot.clone())
    }

    async fn write_slot(&self, id: SlotId, code: &str, status: DeviceSlotStatus) -> Result<()> {
        self.round_trip().await?;
        let mut state = lock_state(&self.state);
        *state.slot_mut(id)? = DeviceSlot::occupied(id, code, status);
        state.writes += 1;
        Ok(())
    }

    async fn clear_slot(&self, id: SlotId) -> Result<()> {
        self.round_trip().await?;
        let mut state = lock_state(&self.state);
        *state.slot_mut(id)? = DeviceSlot::available(id);
        state.writes += 1;
        Ok(())
    }

    async fn next_event(&self) -> Result<LockEvent> {
        self.events_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| DeviceError::disconnected(self.name.clone()))
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        self.round_trip().await?;
        let slot_count = lock_state(&self.state).slots.len();
        Ok(DeviceInfo::new(
            self.name.clone(),
            "Mock Lock v1.0",
            u16::try_from(slot_count).unwrap_or(u16::MAX),
        )
        .with_firmware_version("1.0.0"))
    }
}

/// Handle for controlling a mock lock.
///
/// Dropping every handle closes the event feed; the lock then reports
/// `Disconnected` from `next_event`.
#[derive(Debug, Clone)]
pub struct MockLockHandle {
    state: Arc<Mutex<MockState>>,
    events_tx: mpsc::Sender<LockEvent>,
}

impl MockLockHandle {
    /// Program a PIN directly at the lock, bypassing the engine.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::SlotOutOfRange` for unknown slots.
    pub fn set_keypad_code(&self, id: SlotId, code: &str) -> Result<()> {
        let mut state = lock_state(&self.state);
        *state.slot_mut(id)? = DeviceSlot::occupied(id, code, DeviceSlotStatus::Enabled);
        Ok(())
    }

    /// Enroll a fob credential at the lock.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::SlotOutOfRange` for unknown slots.
    pub fn enroll_fob(&self, id: SlotId, raw: &str) -> Result<()> {
        self.set_keypad_code(id, raw)
    }

    /// Remove whatever credential the lock holds in a slot.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::SlotOutOfRange` for unknown slots.
    pub fn remove(&self, id: SlotId) -> Result<()> {
        let mut state = lock_state(&self.state);
        *state.slot_mut(id)? = DeviceSlot::available(id);
        Ok(())
    }

    /// Current device-side state of a slot.
    pub fn slot(&self, id: SlotId) -> Option<DeviceSlot> {
        lock_state(&self.state).slot_mut(id).ok().cloned()
    }

    /// Delay applied to every device call.
    pub fn set_latency(&self, latency: Duration) {
        lock_state(&self.state).latency = latency;
    }

    /// Fail the next device call with `error`.
    pub fn fail_next(&self, error: DeviceError) {
        lock_state(&self.state).fail_next = Some(error);
    }

    /// Number of successful writes and clears.
    pub fn write_count(&self) -> usize {
        lock_state(&self.state).writes
    }

    /// Push an event onto the lock's feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock has been dropped.
    pub async fn send_event(&self, event: LockEvent) -> Result<()> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| DeviceError::disconnected("Mock lock event channel closed"))
    }

    /// Push an access event stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock has been dropped.
    pub async fn send_access(&self, slot: SlotId, method: AccessMethod) -> Result<()> {
        self.send_event(LockEvent::Access(AccessEvent::new(slot, method, Utc::now())))
            .await
    }
}
