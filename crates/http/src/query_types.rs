//! Request/query types (Deserialize)

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use voiceplan_service::OrchestrationOptions;

/// Upper bound for dashboard windows (30 days).
pub const MAX_WINDOW_HOURS: i64 = 24 * 30;

const fn default_window_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl DashboardQuery {
    pub fn capped_window(&self) -> i64 {
        self.window_hours.clamp(1, MAX_WINDOW_HOURS)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub language: Option<String>,
}

/// JSON form of an orchestration request (typed transcript, no audio).
#[derive(Debug, Deserialize)]
pub struct OrchestrateRequest {
    pub session_id: Option<Uuid>,
    pub language: Option<String>,
    pub transcript: Option<String>,
    pub context: Option<Value>,
    #[serde(default)]
    pub options: OrchestrationOptions,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePlanRequest {
    pub plan: Value,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub max_hours_per_assignee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}
