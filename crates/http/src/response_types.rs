//! Response types (Serialize)

use serde::Serialize;
use voiceplan_core::pii::PiiMatch;

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PiiScanResponse {
    pub total: usize,
    pub matches: Vec<PiiMatch>,
}
