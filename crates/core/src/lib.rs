//! Core types for voiceplan
//!
//! Domain types, the plan reconciler, feature flags and event envelopes shared
//! across all other crates.

mod commit;
pub mod constants;
mod encryption_key;
pub mod env_config;
mod error;
mod events;
mod flags;
pub mod json_utils;
pub mod pii;
mod plan;
mod session;
mod ttl_cache;

pub use commit::*;
pub use encryption_key::*;
pub use error::*;
pub use events::*;
pub use flags::*;
pub use plan::*;
pub use session::*;
pub use ttl_cache::*;
