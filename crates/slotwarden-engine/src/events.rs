//! Events the engine publishes for external consumers.
//!
//! The bus is a `tokio::sync::broadcast` channel: every subscriber sees every
//! event published after it subscribed, and a slow subscriber lags rather
//! than blocking the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use slotwarden_core::{AccessMethod, LockStatus, Slot, SlotId};
use slotwarden_device::AccessEvent;
use tokio::sync::broadcast;
use tracing::trace;

use crate::policy::{AccessOutcome, Evaluation};

/// Event published on the engine bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EngineEvent {
    AccessGranted {
        slot: SlotId,
        name: String,
        method: AccessMethod,
        timestamp: DateTime<Utc>,
        usage_count: u32,
    },
    AccessDeniedDisabled {
        slot: SlotId,
        name: String,
        method: AccessMethod,
        timestamp: DateTime<Utc>,
    },
    AccessDeniedExpired {
        slot: SlotId,
        name: String,
        method: AccessMethod,
        timestamp: DateTime<Utc>,
    },
    AccessDeniedLimit {
        slot: SlotId,
        name: String,
        method: AccessMethod,
        timestamp: DateTime<Utc>,
    },
    /// A grant consumed the last allowed use.
    UsageLimitReached {
        slot: SlotId,
        name: String,
        usage_limit: u32,
    },
    /// Lock/unlock/jam reported by the device.
    LockStatus {
        status: LockStatus,
        method: Option<AccessMethod>,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Events describing one evaluated access, in publication order.
    pub fn for_access(slot: &Slot, evaluation: &Evaluation, event: &AccessEvent) -> Vec<Self> {
        let name = slot.display_name().to_string();
        let (id, method, timestamp) = (slot.id, event.method, event.timestamp);

        let mut events = vec![match evaluation.outcome {
            AccessOutcome::Granted => Self::AccessGranted {
                slot: id,
                name: name.clone(),
                method,
                timestamp,
                usage_count: evaluation.usage_count,
            },
            AccessOutcome::DeniedDisabled => Self::AccessDeniedDisabled {
                slot: id,
                name: name.clone(),
                method,
                timestamp,
            },
            AccessOutcome::DeniedExpired => Self::AccessDeniedExpired {
                slot: id,
                name: name.clone(),
                method,
                timestamp,
            },
            AccessOutcome::DeniedLimitReached => Self::AccessDeniedLimit {
                slot: id,
                name: name.clone(),
                method,
                timestamp,
            },
        }];

        if evaluation.limit_just_reached
            && let Some(usage_limit) = slot.usage_limit
        {
            events.push(Self::UsageLimitReached {
                slot: id,
                name,
                usage_limit,
            });
        }

        events
    }
}

/// Broadcast bus for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            trace!("No engine event subscribers");
        }
    }
}
