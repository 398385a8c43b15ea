//! Desired/actual reconciliation against the lock.
//!
//! # State machine
//!
//! ```text
//!   Empty ──set_code──► PendingPush ──push──► Synced
//!                          ▲   │                │
//!        override set_code │   └──pull: differs─┴──► Conflict
//!                          └──────────────────────────┘
//!   any ──clear / reset──► Empty
//! ```
//!
//! Every operation holds the slot's command lane for its whole duration, so
//! commands on one slot apply in submission order. Device calls are bounded
//! by the configured timeout; a failed or timed-out call leaves the slot
//! exactly as it was.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use slotwarden_core::{AccessCode, CodeKind, Error, Result, Slot, SlotId, SyncState};
use slotwarden_device::timeout::with_timeout;
use slotwarden_device::{DeviceSlot, DeviceSlotStatus, LockDevice};
use tracing::{debug, info, warn};

use crate::store::SlotStore;

/// Operator request to assign a code to a slot.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub code: String,
    pub name: String,
    pub kind: CodeKind,
    /// Overwrite a slot that holds a code this system did not set.
    pub override_protection: bool,
}

impl CodeRequest {
    pub fn pin(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind: CodeKind::Pin,
            override_protection: false,
        }
    }

    pub fn with_override(mut self) -> Self {
        self.override_protection = true;
        self
    }
}

impl std::fmt::Debug for CodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRequest")
            .field("code", &"***")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("override_protection", &self.override_protection)
            .finish()
    }
}

/// Which slots a pull reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullScope {
    All,
    Slot(SlotId),
}

/// Drives push, pull and clear against one lock.
#[derive(Debug)]
pub struct Reconciler<D> {
    device: D,
    device_timeout: Duration,
    min_pin_length: usize,
    max_pin_length: usize,
}

impl<D: LockDevice> Reconciler<D> {
    pub fn new(
        device: D,
        device_timeout: Duration,
        min_pin_length: usize,
        max_pin_length: usize,
    ) -> Self {
        Self {
            device,
            device_timeout,
            min_pin_length,
            max_pin_length,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Write desired state for a slot and mark it pending.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for FOB requests; FOBs are enrolled at the lock
    /// - `Validation` if the PIN is malformed
    /// - `ProtectedSlot` if the slot is in conflict, or mirrors a FOB, and
    ///   the request does not override; the slot is left untouched
    pub async fn set_code(
        &self,
        store: &SlotStore,
        id: SlotId,
        request: CodeRequest,
    ) -> Result<Slot> {
        let _lane = store.lane(id).await?;

        if request.kind == CodeKind::Fob {
            return Err(Error::unsupported("set_code for FOB slots"));
        }
        let code =
            AccessCode::pin_with_bounds(&request.code, self.min_pin_length, self.max_pin_length)?;

        let slot = store.upsert(id, |slot| {
            let protected = slot.sync_state.is_protected() || slot.is_fob();
            if protected && !request.override_protection {
                return Err(Error::protected(id));
            }
            slot.name = request.name;
            slot.code_kind = CodeKind::Pin;
            slot.desired_code = Some(code);
            slot.sync_state = SyncState::PendingPush;
            Ok(())
        })?;

        info!(
            "Slot {} code set (code = \"***\", override = {})",
            id, request.override_protection
        );
        Ok(slot)
    }

    /// Write a pending slot's desired code to the lock.
    ///
    /// The status written is `Enabled` when the slot is enabled and inside
    /// its schedule at push time, otherwise `Disabled`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for FOB slots
    /// - `ProtectedSlot` for slots in conflict
    /// - `InvalidStateTransition` unless the slot is pending
    /// - `Device` / `DeviceTimeout` from the lock; the slot stays pending
    pub async fn push(&self, store: &SlotStore, id: SlotId) -> Result<Slot> {
        let _lane = store.lane(id).await?;
        let slot = store.get(id)?;

        if slot.is_fob() {
            return Err(Error::unsupported("push for FOB slots"));
        }
        if slot.sync_state == SyncState::Conflict {
            return Err(Error::protected(id));
        }
        let code = match (&slot.desired_code, slot.sync_state.accepts_push()) {
            (Some(code), true) => code.clone(),
            _ => {
                return Err(Error::invalid_transition(
                    slot.sync_state,
                    SyncState::Synced,
                ));
            }
        };

        let active = slot.should_be_active(Utc::now());
        let status = DeviceSlotStatus::for_active(active);

        with_timeout(
            "write_slot",
            self.device_timeout,
            self.device.write_slot(id, code.expose(), status),
        )
        .await
        .inspect_err(|e| warn!("Push of slot {} failed: {}", id, e))?;

        // Access events may have changed `enabled` while the write was in
        // flight; stay pending if the written status is already stale.
        let slot = store.upsert(id, |slot| {
            slot.pushed_code = Some(code);
            slot.sync_state = if slot.should_be_active(Utc::now()) == active {
                SyncState::Synced
            } else {
                SyncState::PendingPush
            };
            Ok(())
        })?;

        info!("Pushed slot {} as {:?} (code = \"***\")", id, status);
        Ok(slot)
    }

    /// Push every pending PIN slot. Slots proceed independently.
    pub async fn push_all(&self, store: &SlotStore) -> Vec<(SlotId, Result<Slot>)> {
        let pending: Vec<SlotId> = store
            .all()
            .into_iter()
            .filter(|slot| !slot.is_fob() && slot.sync_state == SyncState::PendingPush)
            .map(|slot| slot.id)
            .collect();

        debug!("Pushing {} pending slots", pending.len());
        let mut pushes = Vec::with_capacity(pending.len());
        for id in pending {
            pushes.push(self.push_one(store, id));
        }
        join_all(pushes).await
    }

    async fn push_one(&self, store: &SlotStore, id: SlotId) -> (SlotId, Result<Slot>) {
        (id, self.push(store, id).await)
    }

    /// Read the lock and update sync state from what it reports.
    ///
    /// Lanes are taken before the lock is read, so a push or edit queued
    /// behind the pull is never compared against a stale reading. Never
    /// changes desired codes or schedules, except the mirrored value of FOB
    /// slots.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an out-of-range single slot
    /// - `Device` / `DeviceTimeout` from the lock; nothing is changed
    pub async fn pull(&self, store: &SlotStore, scope: PullScope) -> Result<Vec<Slot>> {
        let (_lanes, observed) = match scope {
            PullScope::All => {
                let lanes = store.lane_all().await;
                let observed = with_timeout(
                    "read_all_slots",
                    self.device_timeout,
                    self.device.read_all_slots(),
                )
                .await?;
                (lanes, observed)
            }
            PullScope::Slot(id) => {
                let lane = store.lane(id).await?;
                let observed =
                    with_timeout("read_slot", self.device_timeout, self.device.read_slot(id))
                        .await?;
                (vec![lane], vec![observed])
            }
        };

        let now = Utc::now();
        let mut updated = Vec::with_capacity(observed.len());
        for actual in observed {
            if !store.contains(actual.id) {
                debug!("Ignoring device slot {} outside the table", actual.id);
                continue;
            }
            let slot = store.upsert(actual.id, |slot| {
                observe(slot, &actual, now, self.min_pin_length);
                Ok(())
            })?;
            if slot.sync_state == SyncState::Conflict {
                warn!("Slot {} holds a code this system did not set", slot.id);
            }
            updated.push(slot);
        }

        info!("Pulled {} slots", updated.len());
        Ok(updated)
    }

    /// Clear the code from the lock, then locally.
    ///
    /// Keeps name, notification preferences, usage limit and enabled flag.
    /// Only PIN slots this system has synced or queued are cleared on the
    /// lock; conflicting, unverified and FOB slots are cleared locally and
    /// the lock keeps whatever it holds.
    ///
    /// # Errors
    ///
    /// `Device` / `DeviceTimeout` from the lock; the slot is left as it was.
    pub async fn clear_code(&self, store: &SlotStore, id: SlotId) -> Result<Slot> {
        let _lane = store.lane(id).await?;
        self.clear_on_device(store, id).await?;
        let slot = store.upsert(id, |slot| {
            slot.clear_code();
            Ok(())
        })?;
        info!("Cleared code in slot {}", id);
        Ok(slot)
    }

    /// Clear a slot locally without touching the lock.
    pub async fn clear_local(&self, store: &SlotStore, id: SlotId) -> Result<Slot> {
        let _lane = store.lane(id).await?;
        let slot = store.upsert(id, |slot| {
            slot.clear_code();
            Ok(())
        })?;
        info!("Cleared slot {} locally", id);
        Ok(slot)
    }

    /// Clear the lock, then return the slot to its unassigned default.
    ///
    /// The lock is written under the same rule as [`Self::clear_code`].
    pub async fn reset_slot(&self, store: &SlotStore, id: SlotId) -> Result<Slot> {
        let _lane = store.lane(id).await?;
        self.clear_on_device(store, id).await?;
        let slot = store.upsert(id, |slot| {
            slot.reset();
            Ok(())
        })?;
        info!("Reset slot {}", id);
        Ok(slot)
    }

    async fn clear_on_device(&self, store: &SlotStore, id: SlotId) -> Result<()> {
        let slot = store.get(id)?;
        if !owns_device_slot(&slot) {
            if slot.sync_state != SyncState::Empty {
                info!(
                    "Leaving slot {} untouched on the lock ({:?}, {:?})",
                    id, slot.code_kind, slot.sync_state
                );
            }
            return Ok(());
        }
        with_timeout("clear_slot", self.device_timeout, self.device.clear_slot(id))
            .await
            .inspect_err(|e| warn!("Clearing slot {} on the lock failed: {}", id, e))?;
        Ok(())
    }
}

/// Whether this system may write the slot's entry on the lock.
fn owns_device_slot(slot: &Slot) -> bool {
    slot.code_kind == CodeKind::Pin
        && matches!(slot.sync_state, SyncState::Synced | SyncState::PendingPush)
}

/// Apply one device observation to a slot.
pub(crate) fn observe(
    slot: &mut Slot,
    actual: &DeviceSlot,
    now: DateTime<Utc>,
    min_pin_length: usize,
) {
    let device_code = actual
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| actual.is_occupied() && !code.is_empty());

    let looks_like_fob = slot.desired_code.is_none()
        && device_code.is_some_and(|code| AccessCode::looks_like_fob(code, min_pin_length));

    if slot.is_fob() || looks_like_fob {
        slot.pushed_code = None;
        match device_code {
            Some(code) => {
                slot.code_kind = CodeKind::Fob;
                slot.desired_code = Some(AccessCode::fob(code));
                slot.sync_state = SyncState::Synced;
            }
            None => {
                slot.code_kind = CodeKind::Pin;
                slot.desired_code = None;
                slot.sync_state = SyncState::Empty;
            }
        }
        return;
    }

    slot.sync_state = match (device_code, slot.desired_code.clone()) {
        (Some(code), Some(desired)) if desired == *code => {
            slot.pushed_code = Some(desired);
            let expected = DeviceSlotStatus::for_active(slot.should_be_active(now));
            if actual.status == expected {
                SyncState::Synced
            } else {
                SyncState::PendingPush
            }
        }
        // Still the code we wrote before the last set_code.
        (Some(code), Some(_)) if slot.owns_code(code) => SyncState::PendingPush,
        (Some(_), _) => SyncState::Conflict,
        (None, desired) => {
            slot.pushed_code = None;
            if desired.is_some() {
                SyncState::PendingPush
            } else {
                SyncState::Empty
            }
        }
    };
}
