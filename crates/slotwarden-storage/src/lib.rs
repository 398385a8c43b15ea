//! Persistence for slotwarden slot tables.
//!
//! This crate provides the persistence collaborator the engine saves to after
//! every mutation, and the snapshot format used by export/import.
//!
//! # Architecture
//!
//! - [`Database`] - SQLite connection pool with embedded migrations
//! - [`SlotRepository`] - load/save contract, with SQLite and in-memory
//!   implementations and the [`AnySlotRepository`] enum for dispatch
//! - [`SlotSnapshot`] - versioned JSON export of desired state
//!
//! # Examples
//!
//! ```no_run
//! use slotwarden_storage::{Database, DatabaseConfig, SlotRepository, SqliteSlotRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("slotwarden.db")).await?;
//! let repo = SqliteSlotRepository::new(db.pool().clone());
//!
//! let slots = repo.load().await?;
//! println!("{} slots persisted", slots.len());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod repository;
mod row;
pub mod snapshot;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use repository::{
    AnySlotRepository, MemorySlotRepository, SlotRepository, SqliteSlotRepository,
};
pub use snapshot::{SlotRecord, SlotSnapshot};
