//! Slot persistence collaborators.
//!
//! The engine loads the whole slot table once at startup and saves the whole
//! table after every mutation, so the contract is deliberately coarse: no
//! per-slot queries, no partial updates.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use slotwarden_core::Slot;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::row::SlotRow;

/// Repository trait for the slot table.
///
/// Methods return `Send` futures so the engine can persist from spawned
/// tasks; implementations are written with `async fn`.
pub trait SlotRepository: Send + Sync {
    /// Load every persisted slot, ordered by id.
    fn load(&self) -> impl Future<Output = StorageResult<Vec<Slot>>> + Send;

    /// Replace the persisted table with `slots`.
    fn save(&self, slots: &[Slot]) -> impl Future<Output = StorageResult<()>> + Send;
}

/// SQLite implementation of SlotRepository
#[derive(Debug, Clone)]
pub struct SqliteSlotRepository {
    pool: SqlitePool,
}

impl SqliteSlotRepository {
    /// Create a new SQLite slot repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SlotRepository for SqliteSlotRepository {
    async fn load(&self) -> StorageResult<Vec<Slot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, name, code_kind, desired_code, pushed_code, enabled,
                   schedule_start, schedule_end, usage_limit, usage_count,
                   sync_state, notification_enabled, notification_targets,
                   last_access_at, last_access_method
            FROM slots
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Loaded {} slot rows", rows.len());
        rows.into_iter().map(SlotRow::into_slot).collect()
    }

    async fn save(&self, slots: &[Slot]) -> StorageResult<()> {
        let rows = slots
            .iter()
            .map(SlotRow::from_slot)
            .collect::<StorageResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM slots").execute(&mut *tx).await?;

        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO slots (
                    id, name, code_kind, desired_code, pushed_code, enabled,
                    schedule_start, schedule_end, usage_limit, usage_count,
                    sync_state, notification_enabled, notification_targets,
                    last_access_at, last_access_method, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
                "#,
            )
            .bind(row.id)
            .bind(&row.name)
            .bind(&row.code_kind)
            .bind(&row.desired_code)
            .bind(&row.pushed_code)
            .bind(row.enabled)
            .bind(&row.schedule_start)
            .bind(&row.schedule_end)
            .bind(row.usage_limit)
            .bind(row.usage_count)
            .bind(&row.sync_state)
            .bind(row.notification_enabled)
            .bind(&row.notification_targets)
            .bind(row.last_access_at)
            .bind(&row.last_access_method)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Saved {} slot rows", rows.len());
        Ok(())
    }
}

/// In-memory repository for tests and offline use.
///
/// Clones share the same table, so a test can keep one clone to inspect
/// what the engine saved.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotRepository {
    slots: Arc<Mutex<Vec<Slot>>>,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl MemorySlotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with `slots`.
    pub fn with_slots(slots: Vec<Slot>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(slots)),
            ..Self::default()
        }
    }

    /// Last saved table.
    pub fn snapshot(&self) -> Vec<Slot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl SlotRepository for MemorySlotRepository {
    async fn load(&self) -> StorageResult<Vec<Slot>> {
        Ok(self.snapshot())
    }

    async fn save(&self, slots: &[Slot]) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Internal("save rejected".to_string()));
        }
        *self.slots.lock().unwrap_or_else(PoisonError::into_inner) = slots.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Repository chosen at runtime, e.g. the CLI swapping in an in-memory copy
/// for a dry run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnySlotRepository {
    Sqlite(SqliteSlotRepository),
    Memory(MemorySlotRepository),
}

impl SlotRepository for AnySlotRepository {
    async fn load(&self) -> StorageResult<Vec<Slot>> {
        match self {
            Self::Sqlite(repo) => repo.load().await,
            Self::Memory(repo) => repo.load().await,
        }
    }

    async fn save(&self, slots: &[Slot]) -> StorageResult<()> {
        match self {
            Self::Sqlite(repo) => repo.save(slots).await,
            Self::Memory(repo) => repo.save(slots).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwarden_core::SlotId;

    #[tokio::test]
    async fn test_memory_repository_save_and_load() {
        let repo = MemorySlotRepository::new();
        assert!(repo.load().await.unwrap().is_empty());

        let slots: Vec<Slot> = (1..=3).map(|id| Slot::unassigned(SlotId::new(id))).collect();
        repo.save(&slots).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), slots);
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_repository_clones_share_state() {
        let repo = MemorySlotRepository::new();
        let observer = repo.clone();

        repo.save(&[Slot::unassigned(SlotId::new(1))])
            .await
            .unwrap();
        assert_eq!(observer.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_repository_failing_saves() {
        let repo = MemorySlotRepository::new();
        repo.set_fail_saves(true);

        assert!(repo.save(&[]).await.is_err());
        assert_eq!(repo.save_count(), 0);
    }
}
