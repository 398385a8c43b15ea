use crate::{
    Result,
    constants::{MAX_PIN_LENGTH, MIN_PIN_LENGTH},
    error::Error,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// User-code slot identifier.
///
/// Range checking against the configured slot count happens in the slot
/// store, which reports out-of-range ids as [`Error::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u16);

impl SlotId {
    #[must_use]
    pub const fn new(id: u16) -> Self {
        SlotId(id)
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SlotId {
    fn from(id: u16) -> Self {
        SlotId(id)
    }
}

impl FromStr for SlotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u16>()
            .map(SlotId)
            .map_err(|_| Error::validation(format!("Invalid slot id: {s}")))
    }
}

/// Kind of credential held by a slot.
///
/// FOB credentials are enrolled at the lock itself; this system only mirrors
/// what the lock reports and never writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    #[default]
    Pin,
    Fob,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Pin => "pin",
            CodeKind::Fob => "fob",
        }
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pin" => Ok(CodeKind::Pin),
            "fob" => Ok(CodeKind::Fob),
            other => Err(Error::validation(format!("Unknown code kind: {other}"))),
        }
    }
}

/// Secret access code held by a slot.
///
/// # Security
/// Comparison is constant-time and `Debug` never prints the value.
///
/// Deserialization only rejects blank or padded values; PIN length bounds
/// depend on the engine configuration and are checked where records are
/// restored.
#[derive(Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct AccessCode(String);

impl AccessCode {
    /// Validate a PIN against the default length bounds.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the code is not 4-10 ASCII digits.
    pub fn pin(code: &str) -> Result<Self> {
        Self::pin_with_bounds(code, MIN_PIN_LENGTH, MAX_PIN_LENGTH)
    }

    /// Validate a PIN against explicit length bounds.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the code has non-digit characters or its
    /// length is outside `[min_len, max_len]`.
    pub fn pin_with_bounds(code: &str, min_len: usize, max_len: usize) -> Result<Self> {
        let code = code.trim();

        if !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::validation("PIN must contain only digits"));
        }

        let len = code.len();
        if !(min_len..=max_len).contains(&len) {
            return Err(Error::validation(format!(
                "PIN must be {min_len}-{max_len} digits, got {len}"
            )));
        }

        Ok(AccessCode(code.to_string()))
    }

    /// Wrap a FOB identifier as reported by the lock.
    ///
    /// FOB values are opaque; they are never validated or sent back.
    pub fn fob(raw: &str) -> Self {
        AccessCode(raw.trim().to_string())
    }

    /// Access the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether a code reported by a lock looks like a FOB rather than a PIN.
    ///
    /// The lock reports both kinds through the same user-code table; anything
    /// that is not a plausible PIN is treated as a FOB.
    pub fn looks_like_fob(raw: &str, min_pin_len: usize) -> bool {
        let raw = raw.trim();
        !raw.is_empty() && (!raw.chars().all(|c| c.is_ascii_digit()) || raw.len() < min_pin_len)
    }
}

impl TryFrom<String> for AccessCode {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        if raw.is_empty() || raw.trim() != raw {
            return Err(Error::validation("Access code must be non-blank and unpadded"));
        }
        Ok(AccessCode(raw))
    }
}

impl PartialEq for AccessCode {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl PartialEq<str> for AccessCode {
    fn eq(&self, other: &str) -> bool {
        self.0.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("AccessCode(***)")
    }
}

/// Reconciliation state of a slot.
///
/// # Transitions
///
/// - Empty → PendingPush (code set locally) → Synced (push confirmed)
/// - Synced → PendingPush (local edit that changes what the lock must hold)
/// - Synced / PendingPush → Conflict (pull finds a different code on the lock)
/// - Conflict → PendingPush (explicit override)
/// - any → Empty (clear)
/// - Unknown is the state of imported records until the next pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Empty,
    PendingPush,
    Synced,
    Conflict,
    Unknown,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Empty => "empty",
            SyncState::PendingPush => "pending_push",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Unknown => "unknown",
        }
    }

    /// Whether an unknown code on the lock guards this slot.
    pub fn is_protected(&self) -> bool {
        matches!(self, SyncState::Conflict)
    }

    /// Whether a push is accepted from this state.
    pub fn accepts_push(&self) -> bool {
        matches!(self, SyncState::PendingPush)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "empty" => Ok(SyncState::Empty),
            "pending_push" => Ok(SyncState::PendingPush),
            "synced" => Ok(SyncState::Synced),
            "conflict" => Ok(SyncState::Conflict),
            "unknown" => Ok(SyncState::Unknown),
            other => Err(Error::validation(format!("Unknown sync state: {other}"))),
        }
    }
}

/// How the lock was operated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    Pin,
    Fob,
    Manual,
    Remote,
    Auto,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Pin => "pin",
            AccessMethod::Fob => "fob",
            AccessMethod::Manual => "manual",
            AccessMethod::Remote => "remote",
            AccessMethod::Auto => "auto",
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pin" => Ok(AccessMethod::Pin),
            "fob" => Ok(AccessMethod::Fob),
            "manual" => Ok(AccessMethod::Manual),
            "remote" => Ok(AccessMethod::Remote),
            "auto" => Ok(AccessMethod::Auto),
            other => Err(Error::validation(format!("Unknown access method: {other}"))),
        }
    }
}

/// Physical state of the lock bolt as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Locked,
    Unlocked,
    Jammed,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = match self {
            LockStatus::Locked => "locked",
            LockStatus::Unlocked => "unlocked",
            LockStatus::Jammed => "jammed",
        };
        f.write_str(status)
    }
}

/// Time window during which a slot may grant access.
///
/// Both bounds are inclusive and carry their original UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleBounds")]
pub struct Schedule {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

/// Unchecked wire form of a [`Schedule`].
#[derive(Deserialize)]
struct ScheduleBounds {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl TryFrom<ScheduleBounds> for Schedule {
    type Error = Error;

    fn try_from(bounds: ScheduleBounds) -> Result<Self> {
        Schedule::new(bounds.start, bounds.end)
    }
}

impl Schedule {
    /// Create a schedule window.
    ///
    /// # Errors
    /// Returns `Error::Validation` unless `start` is strictly before `end`.
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Result<Self> {
        if start >= end {
            return Err(Error::validation(format!(
                "Schedule start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Schedule { start, end })
    }

    /// Parse a window from two RFC 3339 timestamps.
    ///
    /// # Errors
    /// Returns `Error::Validation` if either timestamp is malformed or the
    /// window is empty.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |value: &str| {
            DateTime::parse_from_rfc3339(value.trim())
                .map_err(|e| Error::validation(format!("Invalid timestamp {value}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Whether `at` falls within `[start, end]`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let start = self.start.with_timezone(&Utc);
        let end = self.end.with_timezone(&Utc);
        start <= at && at <= end
    }
}
