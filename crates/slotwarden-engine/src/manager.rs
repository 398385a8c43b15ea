//! Lock manager: the engine's command surface and access-event pump.
//!
//! # Architecture
//!
//! ```text
//!  operator commands ──► Reconciler ──► LockDevice
//!          │                 │
//!          ▼                 ▼
//!      SlotStore ◄──── PolicyEvaluator ◄── event pump ◄── LockDevice feed
//!          │                 │
//!          ▼                 ▼
//!    SlotRepository    EventBus + NotificationDispatcher
//! ```
//!
//! The pump is the single consumer of the lock's event feed. It evaluates
//! access events one at a time in feed order, so per-slot usage counts
//! never race, and hands notification delivery to separate tasks so slow
//! targets never stall evaluation.
//!
//! # Examples
//!
//! ```no_run
//! use slotwarden_core::SlotId;
//! use slotwarden_device::mock::MockLock;
//! use slotwarden_engine::config::EngineConfig;
//! use slotwarden_engine::manager::LockManager;
//! use slotwarden_engine::mock::MockNotifier;
//! use slotwarden_engine::reconciler::CodeRequest;
//! use slotwarden_storage::MemorySlotRepository;
//!
//! #[tokio::main]
//! async fn main() -> slotwarden_core::Result<()> {
//!     let (lock, _handle) = MockLock::new(20);
//!     let manager = LockManager::open(
//!         EngineConfig::default(),
//!         lock,
//!         MemorySlotRepository::new(),
//!         MockNotifier::new(),
//!     )
//!     .await?;
//!
//!     let pump = manager.start();
//!
//!     manager
//!         .set_code(SlotId::new(3), CodeRequest::pin("4821", "Dog walker"))
//!         .await?;
//!     manager.push(SlotId::new(3)).await?;
//!
//!     pump.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use slotwarden_core::{Error, Result, Schedule, Slot, SlotId};
use slotwarden_device::timeout::with_timeout;
use slotwarden_device::{AccessEvent, LockDevice, LockEvent};
use slotwarden_storage::{SlotRepository, SlotSnapshot};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventBus};
use crate::ledger;
use crate::notify::{DeliveryReport, NotificationDispatcher, NotificationRegistry};
use crate::policy::{Evaluation, PolicyEvaluator};
use crate::reconciler::{CodeRequest, PullScope, Reconciler};
use crate::store::SlotStore;

/// Everything that happened for one processed access event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAccess {
    pub slot: Slot,
    pub evaluation: Evaluation,
    pub delivery: DeliveryReport,
}

struct Inner<D, R, N> {
    config: EngineConfig,
    store: SlotStore,
    reconciler: Reconciler<D>,
    evaluator: PolicyEvaluator,
    dispatcher: NotificationDispatcher<N>,
    repository: R,
    events: EventBus,
    save_lock: Mutex<()>,
}

/// Engine for one lock.
///
/// Cheap to clone; clones share the same slot table.
pub struct LockManager<D, R, N> {
    inner: Arc<Inner<D, R, N>>,
}

impl<D, R, N> Clone for LockManager<D, R, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, R, N> LockManager<D, R, N>
where
    D: LockDevice + 'static,
    R: SlotRepository + 'static,
    N: NotificationRegistry + 'static,
{
    /// Validate `config`, load the persisted table and build the engine.
    ///
    /// # Errors
    ///
    /// - `Validation` for a bad configuration
    /// - `Persistence` if the repository cannot load
    pub async fn open(config: EngineConfig, device: D, repository: R, registry: N) -> Result<Self> {
        config.validate()?;

        let persisted = repository
            .load()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        info!(
            "Loaded {} persisted slots for a {}-slot lock",
            persisted.len(),
            config.slot_count
        );
        describe_lock(&device, &config).await;

        let inner = Inner {
            store: SlotStore::from_slots(config.slot_count, persisted),
            reconciler: Reconciler::new(
                device,
                config.device_timeout_duration(),
                config.min_pin_length,
                config.max_pin_length,
            ),
            evaluator: PolicyEvaluator::new(config.limit_policy),
            dispatcher: NotificationDispatcher::new(registry, config.delivery_timeout_duration()),
            repository,
            events: EventBus::new(config.event_channel_capacity),
            save_lock: Mutex::new(()),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn device(&self) -> &D {
        self.inner.reconciler.device()
    }

    pub fn slot(&self, id: SlotId) -> Result<Slot> {
        self.inner.store.get(id)
    }

    /// Every slot, ordered by id.
    pub fn slots(&self) -> Vec<Slot> {
        self.inner.store.all()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Save the whole table. Saves are serialized and each one snapshots
    /// the table after taking the save lock, so the last save wins with the
    /// latest state.
    async fn persist(&self) -> Result<()> {
        let _guard = self.inner.save_lock.lock().await;
        let slots = self.inner.store.all();
        self.inner.repository.save(&slots).await.map_err(|e| {
            error!("Failed to persist slot table: {}", e);
            Error::Persistence(e.to_string())
        })
    }

    /// Apply a local edit under the slot's command lane, then persist.
    async fn edit<F>(&self, id: SlotId, mutator: F) -> Result<Slot>
    where
        F: FnOnce(&mut Slot) -> Result<()>,
    {
        let slot = {
            let _lane = self.inner.store.lane(id).await?;
            self.inner.store.upsert(id, mutator)?
        };
        self.persist().await?;
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    pub async fn set_code(&self, id: SlotId, request: CodeRequest) -> Result<Slot> {
        let slot = self
            .inner
            .reconciler
            .set_code(&self.inner.store, id, request)
            .await?;
        self.persist().await?;
        Ok(slot)
    }

    pub async fn push(&self, id: SlotId) -> Result<Slot> {
        let slot = self.inner.reconciler.push(&self.inner.store, id).await?;
        self.persist().await?;
        Ok(slot)
    }

    /// Push every pending slot; each slot reports its own result.
    pub async fn push_all(&self) -> Result<Vec<(SlotId, Result<Slot>)>> {
        let results = self.inner.reconciler.push_all(&self.inner.store).await;
        if results.iter().any(|(_, result)| result.is_ok()) {
            self.persist().await?;
        }
        Ok(results)
    }

    /// Read the lock and update sync states. `PullScope::Slot` is the
    /// single-slot sync check.
    pub async fn pull(&self, scope: PullScope) -> Result<Vec<Slot>> {
        let slots = self.inner.reconciler.pull(&self.inner.store, scope).await?;
        self.persist().await?;
        Ok(slots)
    }

    /// Clear the code locally, keeping name and notification preferences.
    /// The lock is cleared too when the slot holds a PIN this system
    /// synced or queued.
    pub async fn clear_code(&self, id: SlotId) -> Result<Slot> {
        let slot = self
            .inner
            .reconciler
            .clear_code(&self.inner.store, id)
            .await?;
        self.persist().await?;
        Ok(slot)
    }

    /// Clear locally without contacting the lock.
    pub async fn clear_local(&self, id: SlotId) -> Result<Slot> {
        let slot = self
            .inner
            .reconciler
            .clear_local(&self.inner.store, id)
            .await?;
        self.persist().await?;
        Ok(slot)
    }

    /// Return the slot to its unassigned default, clearing the lock under
    /// the same rule as [`Self::clear_code`].
    pub async fn reset_slot(&self, id: SlotId) -> Result<Slot> {
        let slot = self
            .inner
            .reconciler
            .reset_slot(&self.inner.store, id)
            .await?;
        self.persist().await?;
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Local policy edits
    // ------------------------------------------------------------------

    pub async fn set_schedule(&self, id: SlotId, schedule: Option<Schedule>) -> Result<Slot> {
        self.edit(id, |slot| {
            slot.schedule = schedule;
            slot.mark_dirty();
            Ok(())
        })
        .await
    }

    /// # Errors
    ///
    /// `Validation` for a zero limit; use `None` for unlimited.
    pub async fn set_usage_limit(&self, id: SlotId, limit: Option<u32>) -> Result<Slot> {
        if limit == Some(0) {
            return Err(Error::validation("Usage limit must be positive"));
        }
        self.edit(id, |slot| {
            slot.usage_limit = limit;
            Ok(())
        })
        .await
    }

    pub async fn reset_usage_count(&self, id: SlotId) -> Result<Slot> {
        self.edit(id, |slot| {
            ledger::reset(slot);
            Ok(())
        })
        .await
    }

    pub async fn enable(&self, id: SlotId) -> Result<Slot> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: SlotId) -> Result<Slot> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: SlotId, enabled: bool) -> Result<Slot> {
        self.edit(id, |slot| {
            if slot.enabled != enabled {
                slot.enabled = enabled;
                slot.mark_dirty();
            }
            Ok(())
        })
        .await
    }

    /// Turn notifications on or off, optionally replacing the target set.
    ///
    /// # Errors
    ///
    /// `Validation` if a target is blank.
    pub async fn set_notification_enabled(
        &self,
        id: SlotId,
        enabled: bool,
        targets: Option<BTreeSet<String>>,
    ) -> Result<Slot> {
        let targets = targets
            .map(|targets| {
                targets
                    .into_iter()
                    .map(|target| {
                        let target = target.trim().to_string();
                        if target.is_empty() {
                            Err(Error::validation("Notification target must not be blank"))
                        } else {
                            Ok(target)
                        }
                    })
                    .collect::<Result<BTreeSet<String>>>()
            })
            .transpose()?;

        self.edit(id, |slot| {
            slot.notification_enabled = enabled;
            if let Some(targets) = targets {
                slot.notification_targets = targets;
            }
            Ok(())
        })
        .await
    }

    /// Send a synthetic notification to the slot's targets.
    pub async fn send_test_notification(&self, id: SlotId) -> Result<DeliveryReport> {
        let slot = self.inner.store.get(id)?;
        let report = self.inner.dispatcher.dispatch_test(&slot).await;
        info!(
            "Test notification for slot {}: {} delivered, {} failed",
            id,
            report.delivered.len(),
            report.failed.len()
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Whole-table commands
    // ------------------------------------------------------------------

    pub fn export_all(&self) -> SlotSnapshot {
        SlotSnapshot::from_slots(self.inner.config.lock_id.clone(), &self.inner.store.all())
    }

    /// Replace the whole table with a snapshot.
    ///
    /// # Errors
    ///
    /// `Validation` if the snapshot does not fit this lock; nothing changes.
    pub async fn import_all(&self, snapshot: SlotSnapshot) -> Result<Vec<Slot>> {
        let config = &self.inner.config;
        let slots =
            snapshot.into_slots(config.slot_count, config.min_pin_length, config.max_pin_length)?;
        {
            let _lanes = self.inner.store.lane_all().await;
            self.inner.store.replace_all(slots)?;
        }
        info!("Imported slot table");
        self.persist().await?;
        Ok(self.inner.store.all())
    }

    /// Forget all local state. The lock itself is not touched.
    pub async fn clear_local_cache(&self) -> Result<()> {
        {
            let _lanes = self.inner.store.lane_all().await;
            let blank = (1..=self.inner.config.slot_count)
                .map(|id| Slot::unassigned(SlotId::new(id)))
                .collect();
            self.inner.store.replace_all(blank)?;
        }
        warn!("Local slot cache cleared");
        self.persist().await
    }

    // ------------------------------------------------------------------
    // Access events
    // ------------------------------------------------------------------

    fn apply_access(&self, event: &AccessEvent) -> Result<(Slot, Evaluation)> {
        let (slot, evaluation) = self
            .inner
            .store
            .upsert_with(event.slot, |slot| {
                let evaluation = self.inner.evaluator.apply(slot, event);
                Ok((slot.clone(), evaluation))
            })
            .inspect_err(|_| warn!("Access event for unknown slot {}", event.slot))?;

        info!(
            "Slot {} {} via {} (usage {})",
            slot.id, evaluation.outcome, event.method, evaluation.usage_count
        );
        for engine_event in EngineEvent::for_access(&slot, &evaluation, event) {
            self.inner.events.publish(engine_event);
        }
        Ok((slot, evaluation))
    }

    /// Evaluate one access event and persist the result, without notifying.
    pub async fn evaluate_access(&self, event: &AccessEvent) -> Result<(Slot, Evaluation)> {
        let result = self.apply_access(event)?;
        self.persist().await?;
        Ok(result)
    }

    /// Notify about an evaluated access, honouring `notify_on_denied`.
    pub async fn notify_access(
        &self,
        slot: &Slot,
        evaluation: &Evaluation,
        event: &AccessEvent,
    ) -> DeliveryReport {
        if !evaluation.outcome.is_granted() && !self.inner.config.notify_on_denied {
            return DeliveryReport::default();
        }
        self.inner
            .dispatcher
            .dispatch(slot, evaluation.outcome, event.method, event.timestamp)
            .await
    }

    /// Process one lock event end to end.
    ///
    /// Returns `None` for status events. A failed save is reported after
    /// notifications have gone out.
    pub async fn process_event(&self, event: &LockEvent) -> Result<Option<ProcessedAccess>> {
        match event {
            LockEvent::Access(access) => {
                let (slot, evaluation) = self.apply_access(access)?;
                let saved = self.persist().await;
                let delivery = self.notify_access(&slot, &evaluation, access).await;
                saved?;
                Ok(Some(ProcessedAccess {
                    slot,
                    evaluation,
                    delivery,
                }))
            }
            other => {
                self.publish_status(other);
                Ok(None)
            }
        }
    }

    fn publish_status(&self, event: &LockEvent) {
        if let LockEvent::Status {
            status,
            method,
            timestamp,
        } = event
        {
            debug!("Lock reported {}", status);
            self.inner.events.publish(EngineEvent::LockStatus {
                status: *status,
                method: *method,
                timestamp: *timestamp,
            });
        }
    }

    /// Spawn the event pump.
    ///
    /// The pump runs until [`ManagerHandle::shutdown`] is called, the handle
    /// is dropped, or the device feed fails.
    pub fn start(&self) -> ManagerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().run_pump(shutdown_rx));
        ManagerHandle { shutdown_tx, task }
    }

    async fn run_pump(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut notifications = JoinSet::new();
        info!("Event pump started");

        let result = loop {
            tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                event = self.device().next_event() => match event {
                    Ok(LockEvent::Access(access)) => match self.apply_access(&access) {
                        Ok((slot, evaluation)) => {
                            if let Err(e) = self.persist().await {
                                warn!("Access recorded but not persisted: {}", e);
                            }
                            let manager = self.clone();
                            notifications.spawn(async move {
                                manager.notify_access(&slot, &evaluation, &access).await
                            });
                        }
                        Err(e) => warn!("Dropping access event: {}", e),
                    },
                    Ok(other) => self.publish_status(&other),
                    Err(e) => {
                        error!("Lock event feed failed: {}", e);
                        break Err(Error::from(e));
                    }
                },
            }

            while let Some(done) = notifications.try_join_next() {
                log_delivery(done);
            }
        };

        while let Some(done) = notifications.join_next().await {
            log_delivery(done);
        }
        info!("Event pump stopped");
        result
    }
}

/// Log what the lock reports about itself. A lock that cannot answer yet
/// does not keep the engine from opening.
async fn describe_lock<D: LockDevice>(device: &D, config: &EngineConfig) {
    let info = match with_timeout(
        "get_info",
        config.device_timeout_duration(),
        device.get_info(),
    )
    .await
    {
        Ok(info) => info,
        Err(e) => {
            let e = Error::from(e);
            if e.is_device_failure() {
                warn!("Lock did not answer get_info: {}", e);
            } else {
                debug!("Lock info unavailable: {}", e);
            }
            return;
        }
    };

    info!(
        "Lock {} ({}, firmware {}) exposes {} user-code slots",
        info.name,
        info.model,
        info.firmware_version.as_deref().unwrap_or("unknown"),
        info.slot_count
    );
    if info.slot_count < config.slot_count {
        warn!(
            "{} slots configured but the lock has {}; pushes above slot {} will fail",
            config.slot_count, info.slot_count, info.slot_count
        );
    }
}

fn log_delivery(done: std::result::Result<DeliveryReport, tokio::task::JoinError>) {
    match done {
        Ok(report) if !report.all_delivered() => {
            debug!("{} notification deliveries failed", report.failed.len());
        }
        Ok(_) => {}
        Err(e) => error!("Notification task failed: {}", e),
    }
}

/// How the event pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpTermination {
    /// Stopped on request.
    Stopped,
    /// The device feed failed.
    Failed(Error),
    /// The task was cancelled.
    Cancelled,
    /// The task panicked.
    Panicked,
}

/// Handle to a running event pump.
///
/// Dropping the handle also stops the pump.
#[derive(Debug)]
pub struct ManagerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl ManagerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pump and wait for in-flight notifications to finish.
    pub async fn shutdown(self) -> PumpTermination {
        // The pump may already have exited on its own
        let _ = self.shutdown_tx.send(true);
        let termination = Self::classify_task_result(self.task.await);
        match &termination {
            PumpTermination::Stopped | PumpTermination::Cancelled => {}
            PumpTermination::Failed(e) => warn!("Event pump had failed: {}", e),
            PumpTermination::Panicked => error!("Event pump panicked"),
        }
        termination
    }

    fn classify_task_result(
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> PumpTermination {
        match result {
            Ok(Ok(())) => PumpTermination::Stopped,
            Ok(Err(e)) => PumpTermination::Failed(e),
            Err(e) if e.is_cancelled() => PumpTermination::Cancelled,
            Err(_) => PumpTermination::Panicked,
        }
    }
}
