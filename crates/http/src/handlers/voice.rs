//! Orchestration, standalone transcription and speech synthesis.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;
use voiceplan_llm::{SpeechFormat, Transcript, TranscriptFormat};
use voiceplan_service::{AudioInput, OrchestrationOptions, OrchestrationRequest, OrchestrationResult};

use crate::AppState;
use crate::api_error::ApiError;
use crate::identity::Identity;
use crate::query_types::{OrchestrateRequest, SpeechRequest};

const AUDIO_FIELDS: [&str; 2] = ["file", "audio"];
const DEFAULT_AUDIO_NAME: &str = "audio.webm";

#[derive(Debug, Default)]
struct AudioForm {
    audio: Option<AudioInput>,
    fields: HashMap<String, String>,
}

impl AudioForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str).map(str::trim).filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid value for `{name}`: {raw}")))
            })
            .transpose()
    }

    fn transcript_format(&self) -> Result<Option<TranscriptFormat>, ApiError> {
        self.text("format")
            .or_else(|| self.text("response_format"))
            .map(|raw| raw.parse().map_err(|e: voiceplan_llm::LlmError| ApiError::BadRequest(e.to_string())))
            .transpose()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<AudioForm, ApiError> {
    let mut form = AudioForm::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.body_text()))? {
        let name = field.name().unwrap_or_default().to_owned();
        if AUDIO_FIELDS.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or(DEFAULT_AUDIO_NAME).to_owned();
            let mime_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.audio = Some(AudioInput { bytes: bytes.to_vec(), file_name, mime_type, format: None });
        } else {
            let value = field.text().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.fields.insert(name, value);
        }
    }
    let format = form.transcript_format()?;
    if let Some(audio) = form.audio.as_mut() {
        audio.format = format;
    }
    Ok(form)
}

fn orchestration_from_form(form: AudioForm) -> Result<OrchestrationRequest, ApiError> {
    let context = form
        .text("context")
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| ApiError::BadRequest(format!("`context` is not JSON: {e}")))
        })
        .transpose()?;
    Ok(OrchestrationRequest {
        session_id: form.parsed::<Uuid>("session_id")?,
        language: form.text("language").map(str::to_owned),
        transcript: form.text("transcript").map(str::to_owned),
        context,
        options: OrchestrationOptions {
            alternatives: form.parsed("alternatives")?.unwrap_or_default(),
            auto_refine: form.parsed("auto_refine")?.unwrap_or_default(),
        },
        audio: form.audio,
    })
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Accepts JSON with a typed transcript, or multipart with an audio `file`
/// plus the same fields as form values.
pub async fn orchestrate(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    request: Request,
) -> Result<Json<OrchestrationResult>, ApiError> {
    let orchestration = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        orchestration_from_form(read_form(multipart).await?)?
    } else {
        let Json(body) = Json::<OrchestrateRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        OrchestrationRequest {
            session_id: body.session_id,
            language: body.language,
            audio: None,
            transcript: body.transcript,
            context: body.context,
            options: body.options,
        }
    };
    Ok(Json(state.orchestrator.orchestrate(&actor, orchestration).await?))
}

pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    multipart: Multipart,
) -> Result<Json<Transcript>, ApiError> {
    let form = read_form(multipart).await?;
    let audio = form
        .audio
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("multipart field `file` is required".to_owned()))?;
    let transcript = state.orchestrator.transcribe(&actor, audio, form.text("language")).await?;
    Ok(Json(transcript))
}

pub async fn speech(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Json(req): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let format = match req.format.as_deref() {
        Some(raw) => raw.parse::<SpeechFormat>().map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => SpeechFormat::default(),
    };
    let speech = state.speech.synthesize(&actor, &req.text, req.voice.as_deref(), format).await?;
    Ok(([(CONTENT_TYPE, speech.format.content_type())], speech.audio).into_response())
}
