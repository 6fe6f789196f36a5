//! Service layer for voiceplan
//!
//! Business logic between the HTTP/CLI surfaces and storage/llm: the
//! voice-to-plan orchestrator, plan commit and rollback, monitoring, and
//! lifecycle event emission.

#![allow(missing_docs, reason = "Internal crate with self-explanatory API")]
#![allow(clippy::missing_errors_doc, reason = "Errors are self-explanatory from Result types")]
#![allow(missing_debug_implementations, reason = "Internal types")]
#![allow(clippy::let_underscore_must_use, reason = "Intentionally ignoring results")]
#![allow(clippy::missing_docs_in_private_items, reason = "Internal crate")]
#![allow(clippy::implicit_return, reason = "Implicit return is idiomatic Rust")]
#![allow(clippy::question_mark_used, reason = "? operator is idiomatic Rust")]
#![allow(clippy::cognitive_complexity, reason = "Complex async flows are inherent")]
#![allow(clippy::min_ident_chars, reason = "Short error vars are idiomatic")]
#![allow(clippy::too_many_arguments, reason = "Service constructors take their collaborators")]

mod actor;
mod commit_service;
mod error;
pub mod events;
pub mod monitoring;
pub mod ops;
pub mod orchestrator;
mod session_service;
mod speech_service;

#[cfg(test)]
mod orchestrator_tests;
#[cfg(test)]
mod test_support;

pub use actor::Actor;
pub use commit_service::{BackfillFailure, BackfillReport, CommitService};
pub use error::ServiceError;
pub use events::{BroadcastSink, EventEmitter, EventSink, TracingSink};
pub use monitoring::{MonitoringConfig, MonitoringService};
pub use orchestrator::{
    AudioInput, OrchestrationOptions, OrchestrationRequest, OrchestrationResult, Orchestrator,
    OrchestratorConfig,
};
pub use session_service::SessionService;
pub use speech_service::SpeechService;
