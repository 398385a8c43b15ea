//! Export/import format for a lock's slot table.
//!
//! A snapshot carries every desired-state field of every slot. The sync
//! state and the last code written to the lock are device-derived and left
//! out: an imported slot has
//! not been compared against any lock yet, so it comes back as `Unknown`
//! (or `Empty` when it holds no code) until the next pull.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use slotwarden_core::constants::SNAPSHOT_VERSION;
use slotwarden_core::{CodeKind, LastAccess, Schedule, Slot, SlotId, SyncState};

use crate::error::{StorageError, StorageResult};
use crate::row::restore_code;

/// Exported slot table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
    pub slots: Vec<SlotRecord>,
}

/// Exported form of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub id: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code_kind: CodeKind,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub schedule_start: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub schedule_end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub notification_enabled: bool,
    #[serde(default)]
    pub notification_targets: BTreeSet<String>,
    #[serde(default)]
    pub last_access: Option<LastAccess>,
}

fn default_enabled() -> bool {
    true
}

impl From<&Slot> for SlotRecord {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id.as_u16(),
            name: slot.name.clone(),
            code_kind: slot.code_kind,
            code: slot.desired_code.as_ref().map(|c| c.expose().to_string()),
            enabled: slot.enabled,
            schedule_start: slot.schedule.map(|s| s.start()),
            schedule_end: slot.schedule.map(|s| s.end()),
            usage_limit: slot.usage_limit,
            usage_count: slot.usage_count,
            notification_enabled: slot.notification_enabled,
            notification_targets: slot.notification_targets.clone(),
            last_access: slot.last_access,
        }
    }
}

impl SlotRecord {
    fn into_slot(self, min_pin_length: usize, max_pin_length: usize) -> StorageResult<Slot> {
        let id = SlotId::new(self.id);

        let desired_code = match (self.code_kind, self.code.as_deref()) {
            (_, None) => None,
            (_, Some(raw)) if raw.trim().is_empty() => None,
            (CodeKind::Pin, Some(raw)) => Some(
                slotwarden_core::AccessCode::pin_with_bounds(raw, min_pin_length, max_pin_length)
                    .map_err(|e| invalid(id, e))?,
            ),
            (CodeKind::Fob, Some(raw)) => Some(restore_code(CodeKind::Fob, raw)?),
        };

        let schedule = match (self.schedule_start, self.schedule_end) {
            (Some(start), Some(end)) => Some(Schedule::new(start, end).map_err(|e| invalid(id, e))?),
            (None, None) => None,
            _ => {
                return Err(StorageError::Validation(format!(
                    "Slot {id}: schedule needs both start and end"
                )));
            }
        };

        if self.usage_limit == Some(0) {
            return Err(StorageError::Validation(format!(
                "Slot {id}: usage limit must be positive"
            )));
        }

        let sync_state = if desired_code.is_some() {
            SyncState::Unknown
        } else {
            SyncState::Empty
        };

        Ok(Slot {
            id,
            name: self.name,
            code_kind: self.code_kind,
            desired_code,
            pushed_code: None,
            enabled: self.enabled,
            schedule,
            usage_limit: self.usage_limit,
            usage_count: self.usage_count,
            sync_state,
            notification_enabled: self.notification_enabled,
            notification_targets: self.notification_targets,
            last_access: self.last_access,
        })
    }
}

fn invalid(id: SlotId, error: slotwarden_core::Error) -> StorageError {
    match error {
        slotwarden_core::Error::Validation(message) => {
            StorageError::Validation(format!("Slot {id}: {message}"))
        }
        other => StorageError::Validation(format!("Slot {id}: {other}")),
    }
}

impl SlotSnapshot {
    /// Snapshot every slot, in id order.
    pub fn from_slots<'a>(
        lock_id: Option<String>,
        slots: impl IntoIterator<Item = &'a Slot>,
    ) -> Self {
        let mut slots: Vec<SlotRecord> = slots.into_iter().map(SlotRecord::from).collect();
        slots.sort_by_key(|record| record.id);

        Self {
            version: SNAPSHOT_VERSION.to_string(),
            lock_id,
            slots,
        }
    }

    /// Rebuild a full table of `slot_count` slots.
    ///
    /// Slots missing from the snapshot come back unassigned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Validation` if:
    /// - The snapshot version is not supported
    /// - A slot id is outside `[1, slot_count]` or appears twice
    /// - A PIN is outside the length bounds, or a schedule is inverted
    pub fn into_slots(
        self,
        slot_count: u16,
        min_pin_length: usize,
        max_pin_length: usize,
    ) -> StorageResult<Vec<Slot>> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StorageError::Validation(format!(
                "Unsupported snapshot version {}",
                self.version
            )));
        }

        let mut restored: BTreeMap<u16, Slot> = BTreeMap::new();
        for record in self.slots {
            if record.id == 0 || record.id > slot_count {
                return Err(StorageError::Validation(format!(
                    "Slot {} is outside 1..={}",
                    record.id, slot_count
                )));
            }
            if restored.contains_key(&record.id) {
                return Err(StorageError::Validation(format!(
                    "Slot {} appears more than once",
                    record.id
                )));
            }
            let id = record.id;
            restored.insert(id, record.into_slot(min_pin_length, max_pin_length)?);
        }

        Ok((1..=slot_count)
            .map(|id| {
                restored
                    .remove(&id)
                    .unwrap_or_else(|| Slot::unassigned(SlotId::new(id)))
            })
            .collect())
    }

    pub fn to_json(&self) -> StorageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
