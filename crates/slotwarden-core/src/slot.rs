//! The slot record.
//!
//! A lock exposes a fixed table of user-code slots. Each [`Slot`] pairs the
//! desired state this system wants the lock to hold with the reconciliation
//! state observed on the last push or pull, plus the access policy and the
//! usage ledger for that slot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{AccessCode, AccessMethod, CodeKind, Schedule, SlotId, SyncState};

/// Most recent access attempt recorded against a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastAccess {
    pub timestamp: DateTime<Utc>,
    pub method: AccessMethod,
}

/// One user-code slot.
///
/// # Fields
///
/// * `id` - Stable slot position, never reused
/// * `name` - Display name; empty means unassigned
/// * `code_kind` - PIN (managed here) or FOB (mirrored from the lock)
/// * `desired_code` - Code this system intends the lock to hold
/// * `pushed_code` - Code this system last wrote to, or confirmed on, the lock
/// * `enabled` - Disabled slots never evaluate as granted
/// * `schedule` - Optional inclusive access window
/// * `usage_limit` - Optional cap on granted accesses
/// * `usage_count` - Granted accesses since the last reset
/// * `sync_state` - Reconciliation state against the lock
/// * `notification_enabled` / `notification_targets` - Access notifications
/// * `last_access` - Last attempt, granted or denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub name: String,
    pub code_kind: CodeKind,
    pub desired_code: Option<AccessCode>,
    #[serde(default)]
    pub pushed_code: Option<AccessCode>,
    pub enabled: bool,
    pub schedule: Option<Schedule>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub sync_state: SyncState,
    pub notification_enabled: bool,
    pub notification_targets: BTreeSet<String>,
    pub last_access: Option<LastAccess>,
}

impl Slot {
    /// An unassigned slot, as every slot starts out.
    pub fn unassigned(id: SlotId) -> Self {
        Self {
            id,
            name: String::new(),
            code_kind: CodeKind::Pin,
            desired_code: None,
            pushed_code: None,
            enabled: true,
            schedule: None,
            usage_limit: None,
            usage_count: 0,
            sync_state: SyncState::Empty,
            notification_enabled: false,
            notification_targets: BTreeSet::new(),
            last_access: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.name.is_empty() || self.desired_code.is_some()
    }

    pub fn is_fob(&self) -> bool {
        self.code_kind == CodeKind::Fob
    }

    /// Whether the lock should hold this slot's code as enabled at `at`.
    ///
    /// A slot that is disabled or outside its schedule is pushed to the lock
    /// with a disabled status so the keypad refuses it.
    pub fn should_be_active(&self, at: DateTime<Utc>) -> bool {
        self.enabled && self.schedule.is_none_or(|s| s.contains(at))
    }

    /// Whether the usage limit has been consumed.
    pub fn limit_reached(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }

    /// Drop code, schedule and usage while keeping name and notification
    /// preferences.
    pub fn clear_code(&mut self) {
        self.code_kind = CodeKind::Pin;
        self.desired_code = None;
        self.pushed_code = None;
        self.schedule = None;
        self.usage_count = 0;
        self.sync_state = SyncState::Empty;
    }

    /// Return the slot to its unassigned default.
    pub fn reset(&mut self) {
        *self = Slot::unassigned(self.id);
    }

    /// Whether `code` is one this system put on the lock itself.
    pub fn owns_code(&self, code: &str) -> bool {
        self.pushed_code.as_ref().is_some_and(|pushed| pushed == code)
    }

    /// Move a synced slot back to pending when a local edit changes what
    /// the lock must hold.
    pub fn mark_dirty(&mut self) {
        if self.desired_code.is_some() && self.sync_state == SyncState::Synced && !self.is_fob() {
            self.sync_state = SyncState::PendingPush;
        }
    }

    /// Name used in notifications and events.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            crate::constants::UNNAMED_USER
        } else {
            &self.name
        }
    }
}
