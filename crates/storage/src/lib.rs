//! Storage layer for voiceplan
//!
//! PostgreSQL (sqlx) and in-memory backends behind async domain traits, unified
//! by the enum-dispatch [`StorageBackend`].

mod backend;
mod error;
mod memory;
pub mod pg_migrations;
mod pg_storage;
mod rows;
pub mod traits;
mod types;

#[cfg(test)]
mod memory_tests;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use pg_storage::PgStorage;
pub use rows::{
    COMMIT_STATUS_COMMITTED, COMMIT_STATUS_PENDING, CommittedPlan, DependencyRow, MilestoneRow,
    PlanRows, ProjectRow, TaskRow, VoiceProvenance,
};
pub use types::{DEFAULT_USER_ROLE, UserRecord, normalize_email};
