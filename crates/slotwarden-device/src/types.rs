//! Types exchanged with lock devices.
//!
//! This module defines the actual state a lock reports for each user-code
//! slot, the events a lock pushes asynchronously, and the mapping from raw
//! lock alarm reports to those events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwarden_core::{AccessMethod, LockStatus, SlotId};

use crate::error::{DeviceError, Result};

/// Generic device information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "Front Door").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Number of user-code slots the lock exposes.
    pub slot_count: u16,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>, slot_count: u16) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            slot_count,
            firmware_version: None,
        }
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

/// User-code status as reported by the lock.
///
/// Raw values follow the user-code command class: 0 available, 1 enabled,
/// 2 disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSlotStatus {
    #[default]
    Available,
    Enabled,
    Disabled,
}

impl DeviceSlotStatus {
    /// Decode a raw status byte.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidData` for values other than 0, 1 or 2.
    pub fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Available),
            1 => Ok(Self::Enabled),
            2 => Ok(Self::Disabled),
            other => Err(DeviceError::invalid_data(format!(
                "Unknown user code status {other}"
            ))),
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Enabled => 1,
            Self::Disabled => 2,
        }
    }

    /// Status to write for a code that should or should not open the lock.
    pub fn for_active(active: bool) -> Self {
        if active { Self::Enabled } else { Self::Disabled }
    }
}

/// Actual state of one slot on the lock.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSlot {
    pub id: SlotId,
    pub status: DeviceSlotStatus,
    pub code: Option<String>,
}

impl DeviceSlot {
    /// An empty slot.
    pub fn available(id: SlotId) -> Self {
        Self {
            id,
            status: DeviceSlotStatus::Available,
            code: None,
        }
    }

    /// A slot holding `code` with the given status.
    pub fn occupied(id: SlotId, code: impl Into<String>, status: DeviceSlotStatus) -> Self {
        Self {
            id,
            status,
            code: Some(code.into()),
        }
    }

    /// Whether the lock holds a credential in this slot.
    pub fn is_occupied(&self) -> bool {
        self.status != DeviceSlotStatus::Available
            && self.code.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

impl std::fmt::Debug for DeviceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSlot")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("code", &self.code.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A credential was used at the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub slot: SlotId,
    pub method: AccessMethod,
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    pub fn new(slot: SlotId, method: AccessMethod, timestamp: DateTime<Utc>) -> Self {
        Self {
            slot,
            method,
            timestamp,
        }
    }
}

/// Alarm types reporting a keypad unlock; the alarm level is the slot.
pub const ALARM_KEYPAD_UNLOCK: [u8; 2] = [144, 19];

/// Alarm type reporting an automatic relock.
pub const ALARM_AUTO_LOCK: u8 = 27;

/// Alarm type reporting a manual unlock.
pub const ALARM_MANUAL_UNLOCK: u8 = 24;

/// Alarm type reporting a manual lock.
pub const ALARM_MANUAL_LOCK: u8 = 25;

/// Alarm type reporting a jammed bolt.
pub const ALARM_JAMMED: u8 = 9;

/// Event pushed asynchronously by a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LockEvent {
    /// A user code or fob was used.
    Access(AccessEvent),

    /// The bolt changed state.
    Status {
        status: LockStatus,
        method: Option<AccessMethod>,
        timestamp: DateTime<Utc>,
    },
}

impl LockEvent {
    /// Map a raw alarm report to an event.
    ///
    /// Returns `None` for alarm types that carry no access or status meaning.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use slotwarden_core::{AccessMethod, SlotId};
    /// use slotwarden_device::types::LockEvent;
    ///
    /// let now = Utc::now();
    /// match LockEvent::from_alarm(19, 3, now) {
    ///     Some(LockEvent::Access(access)) => {
    ///         assert_eq!(access.slot, SlotId::new(3));
    ///         assert_eq!(access.method, AccessMethod::Pin);
    ///     }
    ///     other => panic!("unexpected event: {:?}", other),
    /// }
    ///
    /// assert!(LockEvent::from_alarm(200, 0, now).is_none());
    /// ```
    pub fn from_alarm(alarm_type: u8, alarm_level: u8, timestamp: DateTime<Utc>) -> Option<Self> {
        let status = |status, method| {
            Some(Self::Status {
                status,
                method,
                timestamp,
            })
        };

        match alarm_type {
            t if ALARM_KEYPAD_UNLOCK.contains(&t) => Some(Self::Access(AccessEvent::new(
                SlotId::new(alarm_level as u16),
                AccessMethod::Pin,
                timestamp,
            ))),
            ALARM_AUTO_LOCK => status(LockStatus::Locked, Some(AccessMethod::Auto)),
            ALARM_MANUAL_UNLOCK => status(LockStatus::Unlocked, Some(AccessMethod::Manual)),
            ALARM_MANUAL_LOCK => status(LockStatus::Locked, Some(AccessMethod::Manual)),
            ALARM_JAMMED => status(LockStatus::Jammed, None),
            _ => None,
        }
    }
}
