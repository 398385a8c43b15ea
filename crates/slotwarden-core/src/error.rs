//! Error taxonomy shared by every slotwarden crate.
//!
//! Validation and protection errors are raised before any state is touched.
//! Device errors leave the slot's sync state at its pre-operation value.
//! Access denials are not errors; they are outcomes of policy evaluation.

use thiserror::Error;

use crate::types::SlotId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Slot id outside `[1, N]`.
    #[error("Slot not found: {slot}")]
    NotFound { slot: SlotId },

    /// Operation not valid for this kind of slot (e.g. setting a FOB code).
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// Slot holds a code the lock reports but this system did not set.
    #[error("Slot {slot} is protected: the lock holds an unknown code, override required")]
    ProtectedSlot { slot: SlotId },

    /// Malformed code, schedule, limit or target.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The lock rejected or failed the operation.
    #[error("Device error: {0}")]
    Device(String),

    /// The lock did not answer within the configured bound.
    #[error("Device timeout after {duration_ms}ms during {operation}")]
    DeviceTimeout { operation: String, duration_ms: u64 },

    /// A single notification target could not be reached.
    #[error("Delivery to {target} failed: {message}")]
    Delivery { target: String, message: String },

    /// The persistence collaborator failed to load or save.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation requires a different sync state.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    pub fn not_found(slot: SlotId) -> Self {
        Self::NotFound { slot }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    pub fn protected(slot: SlotId) -> Self {
        Self::ProtectedSlot { slot }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn delivery(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether the error came from talking to the lock.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::Device(_) | Self::DeviceTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
