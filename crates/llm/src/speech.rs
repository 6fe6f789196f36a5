//! Text-to-speech client for `/v1/audio/speech`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ai_types::SpeechRequest;
use crate::client::{build_http_client, status_error};
use crate::error::LlmError;

pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TTS_VOICE: &str = "alloy";
/// Provider limit on input characters.
pub const MAX_SPEECH_INPUT_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl SpeechFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }
}

impl fmt::Display for SpeechFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeechFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "opus" => Ok(Self::Opus),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            other => Err(LlmError::UnsupportedFormat(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub audio: Vec<u8>,
    pub format: SpeechFormat,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// `voice = None` uses the configured default voice.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        format: SpeechFormat,
    ) -> Result<SynthesizedSpeech, LlmError>;
}

pub struct SpeechClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl fmt::Debug for SpeechClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechClient")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl SpeechClient {
    /// Model and default voice come from `VOICEPLAN_TTS_MODEL` / `VOICEPLAN_TTS_VOICE`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: String, base_url: String) -> Result<Self, LlmError> {
        use voiceplan_core::env_config::env_non_empty;
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: env_non_empty("VOICEPLAN_TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_owned()),
            voice: env_non_empty("VOICEPLAN_TTS_VOICE").unwrap_or_else(|| DEFAULT_TTS_VOICE.to_owned()),
        })
    }

    #[must_use]
    pub fn with_voice(mut self, voice: String) -> Self {
        self.voice = voice;
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        format: SpeechFormat,
    ) -> Result<SynthesizedSpeech, LlmError> {
        if text.trim().is_empty() {
            return Err(LlmError::MissingField("input".to_owned()));
        }
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: voice.unwrap_or(&self.voice),
            response_format: format.as_str(),
            speed: None,
        };
        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        tracing::debug!(bytes = audio.len(), format = %format, "speech synthesized");
        Ok(SynthesizedSpeech { audio, format })
    }
}
