//! Error types for lock device operations.
//!
//! These errors describe failures talking to the lock. They convert into
//! [`slotwarden_core::Error`] at the engine boundary, keeping timeouts
//! distinguishable from rejections.

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur during lock device operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The lock answered but refused the operation.
    #[error("Device rejected operation: {message}")]
    Rejected { message: String },

    /// Operation timed out after specified duration.
    #[error("Operation {operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation is not supported by this device.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Slot id outside the lock's user-code table.
    #[error("Slot {slot} is outside the device table")]
    SlotOutOfRange { slot: u16 },
}

impl DeviceError {
    /// Create a new rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

impl From<DeviceError> for slotwarden_core::Error {
    fn from(error: DeviceError) -> Self {
        match error {
            DeviceError::Timeout {
                operation,
                duration_ms,
            } => slotwarden_core::Error::DeviceTimeout {
                operation,
                duration_ms,
            },
            DeviceError::Unsupported { operation } => {
                slotwarden_core::Error::unsupported(operation)
            }
            other => slotwarden_core::Error::Device(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let error = DeviceError::timeout("write_slot", 3000);
        assert!(matches!(error, DeviceError::Timeout { .. }));
        assert_eq!(
            error.to_string(),
            "Operation write_slot timed out after 3000ms"
        );
    }

    #[test]
    fn test_timeout_maps_to_core_timeout() {
        let core: slotwarden_core::Error = DeviceError::timeout("read_all_slots", 500).into();
        assert_eq!(
            core,
            slotwarden_core::Error::DeviceTimeout {
                operation: "read_all_slots".to_string(),
                duration_ms: 500,
            }
        );
    }

    #[test]
    fn test_rejection_maps_to_core_device_error() {
        let core: slotwarden_core::Error = DeviceError::rejected("code in use").into();
        assert_eq!(
            core,
            slotwarden_core::Error::Device("Device rejected operation: code in use".to_string())
        );
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            DeviceError::disconnected("Front Door"),
            DeviceError::unsupported("write_fob"),
            DeviceError::invalid_data("status 7"),
            DeviceError::SlotOutOfRange { slot: 31 },
        ];

        for error in errors {
            let _ = format!("{}", error);
            let _ = format!("{:?}", error);
        }
    }
}
