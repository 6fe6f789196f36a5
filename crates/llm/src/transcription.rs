//! Speech-to-text adapter for OpenAI-compatible `/v1/audio/transcriptions`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use voiceplan_core::constants::DEFAULT_TRANSCRIPT_CONFIDENCE;

use crate::ai_types::{SimpleTranscription, VerboseSegment, VerboseTranscription};
use crate::client::{build_http_client, status_error, truncate};
use crate::error::LlmError;

pub const DEFAULT_STT_MODEL: &str = "whisper-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormat {
    Json,
    Text,
    Srt,
    Vtt,
    #[default]
    VerboseJson,
}

impl TranscriptFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Srt => "srt",
            Self::Vtt => "vtt",
            Self::VerboseJson => "verbose_json",
        }
    }
}

impl fmt::Display for TranscriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscriptFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "srt" => Ok(Self::Srt),
            "vtt" => Ok(Self::Vtt),
            "verbose_json" => Ok(Self::VerboseJson),
            other => Err(LlmError::UnsupportedFormat(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub language: Option<String>,
    pub format: TranscriptFormat,
    pub temperature: Option<f32>,
    pub timestamp_granularities: Vec<String>,
}

impl TranscriptionRequest {
    #[must_use]
    pub fn new(audio: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            audio,
            file_name: file_name.into(),
            mime_type: None,
            language: None,
            format: TranscriptFormat::default(),
            temperature: None,
            timestamp_granularities: vec!["segment".to_owned()],
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TranscriptFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Normalized transcription result, whatever format the provider answered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Transcript without timing data.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: DEFAULT_TRANSCRIPT_CONFIDENCE,
            language: None,
            duration_secs: None,
            segments: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, LlmError>;
}

pub struct TranscriptionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for TranscriptionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionClient")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TranscriptionClient {
    /// The model comes from `VOICEPLAN_STT_MODEL` when set.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        let model = voiceplan_core::env_config::env_non_empty("VOICEPLAN_STT_MODEL")
            .unwrap_or_else(|| DEFAULT_STT_MODEL.to_owned());
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model,
        })
    }

    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_form(&self, request: &TranscriptionRequest) -> Result<Form, LlmError> {
        let mut part = Part::bytes(request.audio.clone()).file_name(request.file_name.clone());
        if let Some(mime) = &request.mime_type {
            part = part.mime_str(mime)?;
        }
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", request.format.as_str());
        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }
        if let Some(temperature) = request.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        if request.format == TranscriptFormat::VerboseJson {
            for granularity in &request.timestamp_granularities {
                form = form.text("timestamp_granularities[]", granularity.clone());
            }
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, LlmError> {
        if request.audio.is_empty() {
            return Err(LlmError::MissingField("file".to_owned()));
        }
        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(self.build_form(request)?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let body = response.text().await?;
        let mut transcript = parse_transcription(request.format, &body)?;
        if transcript.language.is_none() {
            transcript.language.clone_from(&request.language);
        }
        tracing::debug!(
            format = %request.format,
            segments = transcript.segments.len(),
            confidence = transcript.confidence,
            "transcription parsed"
        );
        Ok(transcript)
    }
}

/// Parse a provider body according to the requested format.
///
/// # Errors
/// Returns `JsonParse` when a JSON format body does not decode.
pub fn parse_transcription(format: TranscriptFormat, body: &str) -> Result<Transcript, LlmError> {
    match format {
        TranscriptFormat::Json => {
            let parsed: SimpleTranscription = serde_json::from_str(body).map_err(|e| {
                LlmError::json(format!("json transcription ({})", truncate(body, 200)), e)
            })?;
            Ok(Transcript::plain(parsed.text.trim()))
        },
        TranscriptFormat::Text => Ok(Transcript::plain(body.trim())),
        TranscriptFormat::Srt | TranscriptFormat::Vtt => Ok(from_cues(parse_cues(body))),
        TranscriptFormat::VerboseJson => {
            let parsed: VerboseTranscription = serde_json::from_str(body).map_err(|e| {
                LlmError::json(format!("verbose_json transcription ({})", truncate(body, 200)), e)
            })?;
            Ok(from_verbose(parsed))
        },
    }
}

fn from_verbose(parsed: VerboseTranscription) -> Transcript {
    let confidence = aggregate_confidence(&parsed.segments);
    let segments = parsed
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            confidence: segment_confidence(&s),
            start: s.start,
            end: s.end,
            text: s.text.trim().to_owned(),
        })
        .collect();
    Transcript {
        text: parsed.text.trim().to_owned(),
        confidence,
        language: parsed.language,
        duration_secs: parsed.duration,
        segments,
    }
}

fn segment_confidence(segment: &VerboseSegment) -> Option<f64> {
    let logprob = segment.avg_logprob?;
    let speech = 1.0 - segment.no_speech_prob.unwrap_or(0.0);
    Some((logprob.exp() * speech).clamp(0.0, 1.0))
}

/// Mean of `exp(avg_logprob) * (1 - no_speech_prob)` over scored segments.
fn aggregate_confidence(segments: &[VerboseSegment]) -> f64 {
    let scores: Vec<f64> = segments.iter().filter_map(segment_confidence).collect();
    if scores.is_empty() {
        return DEFAULT_TRANSCRIPT_CONFIDENCE;
    }
    #[allow(clippy::cast_precision_loss, reason = "segment counts are small")]
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    mean.clamp(0.0, 1.0)
}

fn from_cues(segments: Vec<TranscriptSegment>) -> Transcript {
    let text = segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
    let duration_secs = segments.last().map(|s| s.end);
    Transcript {
        text,
        confidence: DEFAULT_TRANSCRIPT_CONFIDENCE,
        language: None,
        duration_secs,
        segments,
    }
}

/// Parse SRT or WebVTT cues. Blocks without a timing line are skipped.
fn parse_cues(body: &str) -> Vec<TranscriptSegment> {
    let normalized = body.replace("\r\n", "\n");
    let mut segments = Vec::new();
    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some((start, end)) = lines.by_ref().find_map(parse_timing_line) else {
            continue;
        };
        let text = lines.collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        segments.push(TranscriptSegment { start, end, text, confidence: None });
    }
    segments
}

/// `00:00:01,000 --> 00:00:02,500` (SRT) or `00:01.000 --> 00:02.000 align:start` (VTT).
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

fn parse_timestamp(raw: &str) -> Option<f64> {
    let normalized = raw.replace(',', ".");
    let mut parts: Vec<&str> = normalized.split(':').collect();
    let seconds: f64 = parts.pop()?.parse().ok()?;
    let minutes = match parts.pop() {
        Some(m) => m.parse::<f64>().ok()?,
        None => 0.0,
    };
    let hours = match parts.pop() {
        Some(h) => h.parse::<f64>().ok()?,
        None => 0.0,
    };
    if !parts.is_empty() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
