//! Subcommand implementations, generic over the repository so they can be
//! exercised against the in-memory store.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use slotwarden_core::{Slot, SlotId};
use slotwarden_engine::{EngineConfig, SlotStore};
use slotwarden_storage::{
    AnySlotRepository, MemorySlotRepository, SlotRepository, SlotSnapshot, SqliteSlotRepository,
};
use tracing::{debug, info, warn};

/// Read an engine configuration file, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Repository the command runs against. A dry run copies the persisted
/// table into memory first.
pub async fn select_repository(
    sqlite: SqliteSlotRepository,
    dry_run: bool,
) -> anyhow::Result<AnySlotRepository> {
    if !dry_run {
        return Ok(AnySlotRepository::Sqlite(sqlite));
    }
    let persisted = sqlite.load().await?;
    info!("Dry run: {} persisted slots copied, nothing will be saved", persisted.len());
    Ok(AnySlotRepository::Memory(MemorySlotRepository::with_slots(
        persisted,
    )))
}

/// The persisted table, padded to the configured slot count.
pub async fn load_table<R: SlotRepository>(
    config: &EngineConfig,
    repo: &R,
) -> anyhow::Result<Vec<Slot>> {
    let persisted = repo.load().await?;
    debug!("Loaded {} persisted slots", persisted.len());
    Ok(SlotStore::from_slots(config.slot_count, persisted).all())
}

pub async fn export<R: SlotRepository>(config: &EngineConfig, repo: &R) -> anyhow::Result<String> {
    let slots = load_table(config, repo).await?;
    let snapshot = SlotSnapshot::from_slots(config.lock_id.clone(), &slots);
    Ok(snapshot.to_json()?)
}

/// Replace the table with a snapshot. Returns the number of assigned slots.
pub async fn import<R: SlotRepository>(
    config: &EngineConfig,
    repo: &R,
    json: &str,
) -> anyhow::Result<usize> {
    let snapshot = SlotSnapshot::from_json(json).context("parsing snapshot")?;
    if let (Some(expected), Some(found)) = (&config.lock_id, &snapshot.lock_id)
        && expected != found
    {
        warn!("Snapshot was exported from lock {found}, importing into {expected}");
    }

    let slots = snapshot.into_slots(
        config.slot_count,
        config.min_pin_length,
        config.max_pin_length,
    )?;
    repo.save(&slots).await?;
    Ok(slots.iter().filter(|slot| slot.is_assigned()).count())
}

pub async fn clear_cache<R: SlotRepository>(config: &EngineConfig, repo: &R) -> anyhow::Result<()> {
    let blank = SlotStore::new(config.slot_count).all();
    repo.save(&blank).await?;
    warn!("Local slot cache cleared");
    Ok(())
}

pub async fn reset_usage<R: SlotRepository>(
    config: &EngineConfig,
    repo: &R,
    slot: u16,
) -> anyhow::Result<Slot> {
    let persisted = repo.load().await?;
    let store = SlotStore::from_slots(config.slot_count, persisted);
    let slot = store.upsert(SlotId::new(slot), |slot| {
        slot.usage_count = 0;
        Ok(())
    })?;
    repo.save(&store.all()).await?;
    Ok(slot)
}

/// Human-readable listing. Codes are never printed.
pub fn render_table(slots: &[Slot]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<20} {:<5} {:<5} {:<12} {:<8} {:<8} SCHEDULE",
        "SLOT", "NAME", "KIND", "CODE", "SYNC", "ENABLED", "USES"
    );

    for slot in slots {
        let uses = match slot.usage_limit {
            Some(limit) => format!("{}/{}", slot.usage_count, limit),
            None => slot.usage_count.to_string(),
        };
        let schedule = slot
            .schedule
            .map(|s| format!("{} .. {}", s.start().to_rfc3339(), s.end().to_rfc3339()))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<5} {:<20} {:<5} {:<5} {:<12} {:<8} {:<8} {}",
            slot.id,
            if slot.name.is_empty() { "-" } else { &slot.name },
            slot.code_kind,
            if slot.desired_code.is_some() { "***" } else { "-" },
            slot.sync_state,
            if slot.enabled { "yes" } else { "no" },
            uses,
            schedule,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwarden_core::{AccessCode, SyncState};
    use slotwarden_storage::Database;

    fn assigned(id: u16, name: &str, code: &str) -> Slot {
        let mut slot = Slot::unassigned(SlotId::new(id));
        slot.name = name.to_string();
        slot.desired_code = Some(AccessCode::pin(code).unwrap());
        slot.sync_state = SyncState::Synced;
        slot
    }

    #[tokio::test]
    async fn test_export_then_import_into_empty_table() {
        let config = EngineConfig::default();
        let source = MemorySlotRepository::with_slots(vec![assigned(2, "Alice", "2468")]);
        let target = MemorySlotRepository::new();

        let json = export(&config, &source).await.unwrap();
        let count = import(&config, &target, &json).await.unwrap();

        assert_eq!(count, 1);
        let restored = target.snapshot();
        assert_eq!(restored.len(), 20);
        assert_eq!(restored[1].name, "Alice");
        assert_eq!(restored[1].sync_state, SyncState::Unknown);
    }

    #[tokio::test]
    async fn test_import_rejects_out_of_range_slots() {
        let config = EngineConfig::default().slot_count(4);
        let repo = MemorySlotRepository::new();
        let json = r#"{"version":"1","slots":[{"id":9,"name":"Too far"}]}"#;

        assert!(import(&config, &repo, json).await.is_err());
        assert_eq!(repo.save_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_usage() {
        let config = EngineConfig::default();
        let mut slot = assigned(3, "Walker", "1357");
        slot.usage_count = 7;
        let repo = MemorySlotRepository::with_slots(vec![slot]);

        let updated = reset_usage(&config, &repo, 3).await.unwrap();

        assert_eq!(updated.usage_count, 0);
        assert_eq!(repo.snapshot()[2].usage_count, 0);
        assert!(reset_usage(&config, &repo, 21).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let config = EngineConfig::default();
        let repo = MemorySlotRepository::with_slots(vec![assigned(1, "Alice", "2468")]);

        clear_cache(&config, &repo).await.unwrap();

        assert!(repo.snapshot().iter().all(|slot| !slot.is_assigned()));
    }

    #[tokio::test]
    async fn test_dry_run_never_writes_to_database() {
        let config = EngineConfig::default();
        let db = Database::in_memory().await.unwrap();
        let sqlite = SqliteSlotRepository::new(db.pool().clone());
        sqlite.save(&[assigned(1, "Alice", "2468")]).await.unwrap();

        let repo = select_repository(sqlite.clone(), true).await.unwrap();
        assert!(matches!(repo, AnySlotRepository::Memory(_)));
        clear_cache(&config, &repo).await.unwrap();
        assert!(load_table(&config, &repo).await.unwrap().iter().all(|s| !s.is_assigned()));

        let persisted = sqlite.load().await.unwrap();
        assert_eq!(persisted[0].name, "Alice");

        let repo = select_repository(sqlite, false).await.unwrap();
        assert!(matches!(repo, AnySlotRepository::Sqlite(_)));
    }

    #[test]
    fn test_render_table_hides_codes() {
        let rendered = render_table(&[assigned(1, "Alice", "2468")]);

        assert!(rendered.contains("Alice"));
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("2468"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"lock_id":"back_door","slot_count":8}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.lock_id.as_deref(), Some("back_door"));
        assert_eq!(config.slot_count, 8);
        assert_eq!(config.min_pin_length, 4);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"slot_count":0}"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
