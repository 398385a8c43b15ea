//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotwarden_core::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_DEVICE_TIMEOUT_MS, MAX_PIN_LENGTH, MAX_USER_SLOTS,
    MIN_PIN_LENGTH,
};
use slotwarden_core::{Error, Result};

/// What happens when a granted access consumes the last allowed use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Grant the access; the next attempt is denied by the limit check.
    #[default]
    LazyDeny,

    /// Grant the access and disable the slot immediately.
    DisableOnLimit,
}

/// Configuration for one lock's engine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use slotwarden_engine::config::{EngineConfig, LimitPolicy};
///
/// let config = EngineConfig::default()
///     .slot_count(30)
///     .device_timeout(Duration::from_secs(5))
///     .limit_policy(LimitPolicy::DisableOnLimit);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identifier written into exports.
    pub lock_id: Option<String>,

    /// Number of user-code slots (N).
    pub slot_count: u16,

    pub min_pin_length: usize,
    pub max_pin_length: usize,

    /// Bound on every device call, in milliseconds.
    pub device_timeout_ms: u64,

    /// Bound on each notification delivery, in milliseconds.
    pub delivery_timeout_ms: u64,

    pub limit_policy: LimitPolicy,

    /// Notify configured targets on denied attempts as well as grants.
    pub notify_on_denied: bool,

    /// Capacity of the engine event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_id: None,
            slot_count: MAX_USER_SLOTS,
            min_pin_length: MIN_PIN_LENGTH,
            max_pin_length: MAX_PIN_LENGTH,
            device_timeout_ms: DEFAULT_DEVICE_TIMEOUT_MS,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            limit_policy: LimitPolicy::default(),
            notify_on_denied: true,
            event_channel_capacity: 100,
        }
    }
}

impl EngineConfig {
    pub fn lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }

    pub fn slot_count(mut self, slot_count: u16) -> Self {
        self.slot_count = slot_count;
        self
    }

    pub fn pin_length(mut self, min: usize, max: usize) -> Self {
        self.min_pin_length = min;
        self.max_pin_length = max;
        self
    }

    pub fn device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn limit_policy(mut self, policy: LimitPolicy) -> Self {
        self.limit_policy = policy;
        self
    }

    pub fn notify_on_denied(mut self, notify: bool) -> Self {
        self.notify_on_denied = notify;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn device_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn delivery_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(Error::validation("slot_count must be at least 1"));
        }
        if self.min_pin_length == 0 || self.min_pin_length > self.max_pin_length {
            return Err(Error::validation(format!(
                "Invalid PIN length bounds {}..={}",
                self.min_pin_length, self.max_pin_length
            )));
        }
        if self.device_timeout_ms == 0 {
            return Err(Error::validation("device_timeout_ms must be positive"));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(Error::validation("delivery_timeout_ms must be positive"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::validation("event_channel_capacity must be positive"));
        }
        Ok(())
    }
}
