//! Shared constants for voiceplan.
//!
//! Centralizes limits and defaults referenced by more than one crate.

/// PostgreSQL connection pool: maximum connections.
pub const PG_POOL_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL connection pool: acquire timeout in seconds.
pub const PG_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL connection pool: idle timeout in seconds.
pub const PG_POOL_IDLE_TIMEOUT_SECS: u64 = 300;

/// Plan title length above which the reconciler warns.
pub const MAX_PLAN_TITLE_LEN: usize = 200;

/// Task count above which the reconciler suggests restructuring.
pub const RECONCILER_TASK_WARNING_THRESHOLD: usize = 50;

/// Hard task cap applied by the orchestrator's final structural gate.
///
/// Differs from [`RECONCILER_TASK_WARNING_THRESHOLD`]: the reconciler only warns,
/// the orchestrator rejects.
pub const DEFAULT_ORCHESTRATOR_MAX_TASKS: usize = 100;

/// Estimated hours above which a single task is flagged.
pub const HIGH_TASK_ESTIMATE_HOURS: f64 = 100.0;

/// Default per-assignee hour budget before an over-allocation conflict is raised.
pub const DEFAULT_MAX_HOURS_PER_ASSIGNEE: f64 = 160.0;

/// Plan confidence used when the generator does not report one.
pub const DEFAULT_PLAN_CONFIDENCE: f64 = 0.7;

/// Transcript confidence used when the provider response carries no per-segment scores.
pub const DEFAULT_TRANSCRIPT_CONFIDENCE: f64 = 0.8;

/// Default metrics retention window in days.
pub const DEFAULT_METRICS_RETENTION_DAYS: i64 = 30;

/// Maximum rows returned by list endpoints.
pub const MAX_LIST_LIMIT: usize = 500;

/// Default rows returned by list endpoints when the caller gives no limit.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Version stamped on every event envelope.
pub const EVENT_SCHEMA_VERSION: &str = "1.0.0";
