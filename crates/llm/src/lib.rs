//! Provider clients: chat-completion plan generation, speech-to-text and text-to-speech.

mod ai_types;
pub mod client;
pub mod error;
pub mod plan;
pub mod speech;
pub mod transcription;

#[cfg(test)]
mod provider_tests;
#[cfg(test)]
mod retry_tests;

pub use client::LlmClient;
pub use error::LlmError;
pub use plan::{GeneratedPlan, PlanGenerator, PlanOptions, PlanRequest};
pub use speech::{SpeechClient, SpeechFormat, SpeechSynthesizer, SynthesizedSpeech};
pub use transcription::{
    Transcriber, Transcript, TranscriptFormat, TranscriptSegment, TranscriptionClient,
    TranscriptionRequest,
};
