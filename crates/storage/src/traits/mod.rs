//! Storage backend trait abstraction
//!
//! Async domain traits implemented by the PostgreSQL and in-memory backends.

pub mod misc;
pub mod plan;
pub mod session;

pub use misc::{HealthStore, UserStore};
pub use plan::{AuditStore, PlanStore};
pub use session::SessionStore;
