//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use slotwarden_core::{AccessMethod, SlotId};
use slotwarden_device::mock::{MockLock, MockLockHandle};
use slotwarden_device::{AccessEvent, LockEvent};
use slotwarden_engine::mock::MockNotifier;
use slotwarden_engine::{EngineConfig, LockManager};
use slotwarden_storage::MemorySlotRepository;

pub type TestManager = LockManager<MockLock, MemorySlotRepository, MockNotifier>;

/// A manager wired to mock collaborators, with handles to all of them.
pub struct Harness {
    pub manager: TestManager,
    pub lock: MockLockHandle,
    pub repo: MemorySlotRepository,
    pub notifier: MockNotifier,
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default(), MockNotifier::new()).await
}

pub async fn harness_with(config: EngineConfig, notifier: MockNotifier) -> Harness {
    let (lock, handle) = MockLock::new(config.slot_count);
    let repo = MemorySlotRepository::new();
    let manager = LockManager::open(config, lock, repo.clone(), notifier.clone())
        .await
        .expect("manager should open");

    Harness {
        manager,
        lock: handle,
        repo,
        notifier,
    }
}

/// Fixed instant on 2025-06-01 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn keypad_access(slot: u16, timestamp: DateTime<Utc>) -> LockEvent {
    LockEvent::Access(AccessEvent::new(
        SlotId::new(slot),
        AccessMethod::Pin,
        timestamp,
    ))
}
