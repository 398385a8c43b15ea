//! Core constants for slot management.
//!
//! These values mirror the user-code capabilities of the supported locks and
//! the defaults the engine falls back to when no configuration overrides them.
//!
//! # Usage
//!
//! ```
//! use slotwarden_core::constants::*;
//!
//! fn is_plausible_pin(code: &str) -> bool {
//!     (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&code.len())
//!         && code.chars().all(|c| c.is_ascii_digit())
//! }
//!
//! assert!(is_plausible_pin("1234"));
//! assert!(!is_plausible_pin("12"));
//! ```

// ============================================================================
// Slot Table
// ============================================================================

/// Lowest addressable user-code slot.
pub const MIN_SLOT_ID: u16 = 1;

/// Default number of user-code slots on a lock.
///
/// The slot table is sized once at construction and never resized.
pub const MAX_USER_SLOTS: u16 = 20;

// ============================================================================
// Code Format
// ============================================================================

/// Minimum number of digits in a PIN code.
pub const MIN_PIN_LENGTH: usize = 4;

/// Maximum number of digits in a PIN code.
pub const MAX_PIN_LENGTH: usize = 10;

// ============================================================================
// Notifications
// ============================================================================

/// Wildcard notification target.
///
/// Expands, at dispatch time, to every mobile target the notification
/// registry currently reports.
pub const ALL_MOBILE_TARGET: &str = "ALL_MOBILE";

/// Title template for access notifications.
///
/// Placeholders: `{outcome}`.
pub const NOTIFICATION_TITLE_TEMPLATE: &str = "Lock access {outcome}";

/// Body template for access notifications.
///
/// Placeholders: `{user}`, `{slot}`, `{method}`, `{timestamp}`.
pub const NOTIFICATION_BODY_TEMPLATE: &str =
    "{user} (slot {slot}) used {method} at {timestamp}";

/// Display name used in notifications for slots without a name.
pub const UNNAMED_USER: &str = "Unknown user";

// ============================================================================
// Timeouts
// ============================================================================

/// Default bound on a single device call, in milliseconds.
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 3_000;

/// Default bound on a single notification delivery, in milliseconds.
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Snapshot Format
// ============================================================================

/// Version tag written into exported slot snapshots.
pub const SNAPSHOT_VERSION: &str = "1";
