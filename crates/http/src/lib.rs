//! HTTP API server for voiceplan.

#![allow(missing_docs, reason = "Internal crate with self-explanatory API")]
#![allow(unreachable_pub, reason = "pub items are re-exported")]
#![allow(clippy::absolute_paths, reason = "Explicit paths for clarity")]
#![allow(missing_debug_implementations, reason = "Internal types")]
#![allow(clippy::missing_docs_in_private_items, reason = "Internal crate")]
#![allow(clippy::implicit_return, reason = "Implicit return is idiomatic Rust")]
#![allow(clippy::question_mark_used, reason = "? operator is idiomatic Rust")]
#![allow(clippy::min_ident_chars, reason = "Short closure params are idiomatic")]
#![allow(clippy::shadow_reuse, reason = "Shadowing for Arc clones is idiomatic")]
#![allow(clippy::exhaustive_structs, reason = "HTTP types are stable")]
#![allow(clippy::single_call_fn, reason = "Helper functions improve readability")]

pub mod api_error;
mod handlers;
pub mod identity;
mod query_types;
mod response_types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use voiceplan_core::FeatureGate;
use voiceplan_llm::{PlanGenerator, SpeechSynthesizer, Transcriber};
use voiceplan_service::events::EVENT_CHANNEL_CAPACITY;
use voiceplan_service::{
    CommitService, EventEmitter, MonitoringConfig, MonitoringService, Orchestrator,
    OrchestratorConfig, SessionService, SpeechService,
};
use voiceplan_storage::StorageBackend;

pub use api_error::ApiError;
pub use identity::{Identity, ORGANIZATION_HEADER, USER_HEADER};
pub use response_types::{ReadinessResponse, VersionResponse};

/// Audio uploads are capped at the provider's file limit.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// External AI providers. Speech-to-text and text-to-speech are optional.
pub struct Providers {
    pub planner: Arc<dyn PlanGenerator>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

/// Shared application state for all HTTP handlers.
pub struct AppState {
    pub storage: Arc<StorageBackend>,
    /// Serialized event envelopes, fanned out to SSE subscribers.
    pub event_tx: broadcast::Sender<String>,
    pub monitoring: Arc<MonitoringService>,
    pub sessions: Arc<SessionService>,
    pub orchestrator: Arc<Orchestrator>,
    pub commits: Arc<CommitService>,
    pub speech: Arc<SpeechService>,
}

impl AppState {
    #[must_use]
    pub fn new(
        storage: Arc<StorageBackend>,
        flags: Arc<dyn FeatureGate>,
        providers: Providers,
        orchestrator_config: OrchestratorConfig,
        monitoring_config: MonitoringConfig,
    ) -> Self {
        // Initial receiver dropped; subscribers use event_tx.subscribe()
        let (event_tx, _initial_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let events = Arc::new(EventEmitter::with_broadcast(event_tx.clone()));
        let monitoring = Arc::new(MonitoringService::new(monitoring_config));
        Self {
            sessions: Arc::new(SessionService::new(storage.clone(), flags.clone(), events.clone())),
            commits: Arc::new(CommitService::new(storage.clone(), flags.clone(), events.clone())),
            orchestrator: Arc::new(Orchestrator::new(
                storage.clone(),
                flags.clone(),
                providers.planner,
                providers.transcriber,
                monitoring.clone(),
                events,
                orchestrator_config,
            )),
            speech: Arc::new(SpeechService::new(flags, providers.synthesizer)),
            storage,
            event_tx,
            monitoring,
        }
    }
}

/// Allow the listed origins; with none, no CORS headers are sent.
#[must_use]
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    if allowed.is_empty() {
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::system::health))
        .route("/api/readiness", get(handlers::system::readiness))
        .route("/api/version", get(handlers::system::version))
        .route(
            "/api/voice/sessions",
            post(handlers::sessions::create_session).get(handlers::sessions::list_sessions),
        )
        .route("/api/voice/sessions/{id}", get(handlers::sessions::get_session))
        .route("/api/voice/sessions/{id}/capture", post(handlers::sessions::start_capture))
        .route("/api/voice/sessions/{id}/cancel", post(handlers::sessions::cancel_session))
        .route("/api/voice/sessions/{id}/commit", post(handlers::commit::commit_plan))
        .route("/api/voice/sessions/{id}/rollback", post(handlers::commit::rollback_plan))
        .route("/api/voice/sessions/{id}/audit", get(handlers::commit::list_audit))
        .route("/api/voice/orchestrate", post(handlers::voice::orchestrate))
        .route("/api/voice/transcribe", post(handlers::voice::transcribe))
        .route("/api/voice/speech", post(handlers::voice::speech))
        .route("/api/plans/validate", post(handlers::plans::validate))
        .route("/api/monitoring/dashboard", get(handlers::monitoring::dashboard))
        .route("/api/monitoring/status", get(handlers::monitoring::status))
        .route("/api/monitoring/alerts", get(handlers::monitoring::alerts))
        .route("/api/monitoring/alerts/{id}/resolve", post(handlers::monitoring::resolve_alert))
        .route("/api/pii/scan", post(handlers::pii::scan))
        .route("/api/pii/redact", post(handlers::pii::redact))
        .route("/events", get(handlers::events::sse_events))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
