use axum::Json;
use voiceplan_core::pii::{self, MAX_SCAN_INPUT_BYTES, Redaction};

use crate::api_error::ApiError;
use crate::identity::Identity;
use crate::query_types::TextRequest;
use crate::response_types::PiiScanResponse;

/// Regex scanning is CPU-bound; keep it off the async workers.
async fn run_blocking<T, F>(text: String, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&str) -> T + Send + 'static,
    T: Send + 'static,
{
    if text.len() > MAX_SCAN_INPUT_BYTES {
        return Err(ApiError::BadRequest(format!(
            "text is {} bytes, the maximum is {MAX_SCAN_INPUT_BYTES}",
            text.len()
        )));
    }
    tokio::task::spawn_blocking(move || f(&text))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("pii task failed: {e}")))
}

pub async fn scan(
    Identity(_actor): Identity,
    Json(req): Json<TextRequest>,
) -> Result<Json<PiiScanResponse>, ApiError> {
    let matches = run_blocking(req.text, pii::scan).await?;
    Ok(Json(PiiScanResponse { total: matches.len(), matches }))
}

pub async fn redact(
    Identity(_actor): Identity,
    Json(req): Json<TextRequest>,
) -> Result<Json<Redaction>, ApiError> {
    Ok(Json(run_blocking(req.text, pii::redact).await?))
}
