use std::sync::Arc;

use voiceplan_core::{FLAG_VOICE_SPEECH, FeatureGate};
use voiceplan_llm::speech::MAX_SPEECH_INPUT_CHARS;
use voiceplan_llm::{SpeechFormat, SpeechSynthesizer, SynthesizedSpeech};

use crate::session_service::require_flag;
use crate::{Actor, ServiceError};

/// Text-to-speech for read-back of generated plans.
pub struct SpeechService {
    flags: Arc<dyn FeatureGate>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl SpeechService {
    #[must_use]
    pub fn new(flags: Arc<dyn FeatureGate>, synthesizer: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self { flags, synthesizer }
    }

    pub async fn synthesize(
        &self,
        actor: &Actor,
        text: &str,
        voice: Option<&str>,
        format: SpeechFormat,
    ) -> Result<SynthesizedSpeech, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_SPEECH, actor)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput("text is required".to_owned()));
        }
        let chars = text.chars().count();
        if chars > MAX_SPEECH_INPUT_CHARS {
            return Err(ServiceError::InvalidInput(format!(
                "text has {chars} characters, the maximum is {MAX_SPEECH_INPUT_CHARS}"
            )));
        }
        let Some(synthesizer) = &self.synthesizer else {
            return Err(ServiceError::SpeechFailed("no text-to-speech provider configured".to_owned()));
        };
        synthesizer
            .synthesize(text, voice.map(str::trim).filter(|v| !v.is_empty()), format)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "speech synthesis failed");
                ServiceError::SpeechFailed(e.to_string())
            })
    }
}
