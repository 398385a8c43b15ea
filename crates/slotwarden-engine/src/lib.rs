//! Reconciliation and access-policy engine for slotwarden.
//!
//! A [`LockManager`](manager::LockManager) owns the desired state of every
//! user-code slot on one lock and keeps it reconciled with what the lock
//! actually holds:
//!
//! - **Reconciliation** ([`reconciler`]): set a desired PIN, push it to the
//!   lock, pull and compare, clear. Slots carry a [`SyncState`] that says
//!   how local and device state relate.
//! - **Policy** ([`policy`]): every access event is classified against the
//!   slot's enabled flag, schedule and usage limit before anything else
//!   happens.
//! - **Notifications** ([`notify`]): evaluated accesses fan out to the
//!   slot's notification targets, each delivery bounded by a timeout.
//! - **Events** ([`events`]): outcomes are broadcast as [`EngineEvent`]s.
//!
//! Collaborators are traits: [`slotwarden_device::LockDevice`] for the
//! lock, [`slotwarden_storage::SlotRepository`] for persistence and
//! [`NotificationRegistry`](notify::NotificationRegistry) for delivery.
//! [`mock`] provides an in-memory registry for tests.
//!
//! [`SyncState`]: slotwarden_core::SyncState
//! [`EngineEvent`]: events::EngineEvent

pub mod config;
pub mod events;
mod ledger;
pub mod manager;
pub mod mock;
pub mod notify;
pub mod policy;
pub mod reconciler;
pub mod store;

pub use config::{EngineConfig, LimitPolicy};
pub use events::{EngineEvent, EventBus};
pub use manager::{LockManager, ManagerHandle, ProcessedAccess, PumpTermination};
pub use notify::{DeliveryReport, NotificationDispatcher, NotificationMessage, NotificationRegistry};
pub use policy::{AccessOutcome, Evaluation, PolicyEvaluator};
pub use reconciler::{CodeRequest, PullScope, Reconciler};
pub use store::SlotStore;
