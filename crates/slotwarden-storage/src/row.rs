//! Row mapping between [`Slot`] and the `slots` table.
//!
//! Enums are stored by their snake_case names, schedule bounds as RFC 3339
//! text (keeping the original offset), and notification targets as a JSON
//! array.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use slotwarden_core::{
    AccessCode, AccessMethod, CodeKind, LastAccess, Schedule, Slot, SlotId, SyncState,
};

use crate::error::{StorageError, StorageResult};

/// Raw `slots` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SlotRow {
    pub id: i64,
    pub name: String,
    pub code_kind: String,
    pub desired_code: Option<String>,
    pub pushed_code: Option<String>,
    pub enabled: bool,
    pub schedule_start: Option<String>,
    pub schedule_end: Option<String>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub sync_state: String,
    pub notification_enabled: bool,
    pub notification_targets: String,
    pub last_access_at: Option<DateTime<Utc>>,
    pub last_access_method: Option<String>,
}

/// Rebuild a code that was validated when it was first set.
///
/// PIN bounds are an engine setting, so only the digit rule is rechecked.
pub(crate) fn restore_code(kind: CodeKind, raw: &str) -> slotwarden_core::Result<AccessCode> {
    match kind {
        CodeKind::Fob => Ok(AccessCode::fob(raw)),
        CodeKind::Pin => AccessCode::pin_with_bounds(raw, 1, usize::MAX),
    }
}

impl SlotRow {
    pub fn from_slot(slot: &Slot) -> StorageResult<Self> {
        Ok(Self {
            id: i64::from(slot.id.as_u16()),
            name: slot.name.clone(),
            code_kind: slot.code_kind.as_str().to_string(),
            desired_code: slot.desired_code.as_ref().map(|c| c.expose().to_string()),
            pushed_code: slot.pushed_code.as_ref().map(|c| c.expose().to_string()),
            enabled: slot.enabled,
            schedule_start: slot.schedule.map(|s| s.start().to_rfc3339()),
            schedule_end: slot.schedule.map(|s| s.end().to_rfc3339()),
            usage_limit: slot.usage_limit.map(i64::from),
            usage_count: i64::from(slot.usage_count),
            sync_state: slot.sync_state.as_str().to_string(),
            notification_enabled: slot.notification_enabled,
            notification_targets: serde_json::to_string(&slot.notification_targets)?,
            last_access_at: slot.last_access.map(|a| a.timestamp),
            last_access_method: slot.last_access.map(|a| a.method.as_str().to_string()),
        })
    }

    pub fn into_slot(self) -> StorageResult<Slot> {
        let row_id = self.id;
        let corrupt = |e: slotwarden_core::Error| StorageError::corrupt(row_id, e.to_string());

        let id = u16::try_from(self.id)
            .map(SlotId::new)
            .map_err(|_| StorageError::corrupt(row_id, "id out of range"))?;
        let code_kind: CodeKind = self.code_kind.parse().map_err(corrupt)?;

        let desired_code = self
            .desired_code
            .as_deref()
            .map(|raw| restore_code(code_kind, raw))
            .transpose()
            .map_err(corrupt)?;
        let pushed_code = self
            .pushed_code
            .as_deref()
            .map(|raw| restore_code(CodeKind::Pin, raw))
            .transpose()
            .map_err(corrupt)?;

        let schedule = match (self.schedule_start.as_deref(), self.schedule_end.as_deref()) {
            (Some(start), Some(end)) => Some(Schedule::parse(start, end).map_err(corrupt)?),
            (None, None) => None,
            _ => return Err(StorageError::corrupt(row_id, "half-open schedule")),
        };

        let usage_limit = self
            .usage_limit
            .map(u32::try_from)
            .transpose()
            .map_err(|_| StorageError::corrupt(row_id, "usage limit out of range"))?;
        let usage_count = u32::try_from(self.usage_count)
            .map_err(|_| StorageError::corrupt(row_id, "usage count out of range"))?;

        let sync_state: SyncState = self.sync_state.parse().map_err(corrupt)?;

        let notification_targets: BTreeSet<String> =
            serde_json::from_str(&self.notification_targets)?;

        let last_access = match (self.last_access_at, self.last_access_method.as_deref()) {
            (Some(timestamp), Some(method)) => Some(LastAccess {
                timestamp,
                method: method.parse::<AccessMethod>().map_err(corrupt)?,
            }),
            _ => None,
        };

        Ok(Slot {
            id,
            name: self.name,
            code_kind,
            desired_code,
            pushed_code,
            enabled: self.enabled,
            schedule,
            usage_limit,
            usage_count,
            sync_state,
            notification_enabled: self.notification_enabled,
            notification_targets,
            last_access,
        })
    }
}
