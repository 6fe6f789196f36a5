#![allow(clippy::unwrap_used, reason = "test code")]

use std::time::Duration;

use serde_json::json;
use voiceplan_core::{IssueSeverity, ValidationIssue};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::plan::{PlanGenerator, PlanRequest};
use crate::speech::{SpeechClient, SpeechFormat, SpeechSynthesizer};
use crate::transcription::{
    TranscriptFormat, Transcriber, TranscriptionClient, TranscriptionRequest,
};
use crate::{LlmClient, LlmError};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"content": content, "role": "assistant"}}]
    }))
}

fn plan_client(server: &MockServer) -> LlmClient {
    LlmClient::new("k".to_owned(), format!("{}/", server.uri()))
        .unwrap()
        .with_model("planner".to_owned())
        .with_retry_delays(vec![Duration::ZERO; 4])
}

#[tokio::test]
async fn generate_plan_strips_fences_and_reads_confidence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
        .and(body_string_contains("ship the beta"))
        .respond_with(completion(
            "```json\n{\"plan\": {\"title\": \"Beta\", \"tasks\": [{\"id\": \"t1\", \"title\": \"Ship\", \"priority\": \"high\"}]}, \"confidence\": 0.9}\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let generated =
        plan_client(&server).generate_plan(&PlanRequest::new("we need to ship the beta")).await.unwrap();
    assert_eq!(generated.plan["title"], "Beta");
    assert!((generated.confidence - 0.9).abs() < f64::EPSILON);
    assert_eq!(generated.model, "planner");
}

#[tokio::test]
async fn refine_plan_sends_issue_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("INVALID_PRIORITY"))
        .respond_with(completion("{\"title\": \"Fixed\", \"tasks\": []}"))
        .expect(1)
        .mount(&server)
        .await;

    let issues = vec![ValidationIssue {
        field: "tasks[0].priority".into(),
        code: "INVALID_PRIORITY".into(),
        message: "priority must be one of low, medium, high, critical".into(),
        suggestion: None,
        severity: IssueSeverity::Error,
    }];
    let refined = plan_client(&server).refine_plan(&json!({"title": "x"}), &issues).await.unwrap();
    assert_eq!(refined.plan["title"], "Fixed");
}

#[tokio::test]
async fn zero_alternatives_skips_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(completion("[]")).expect(0).mount(&server).await;
    let plans = plan_client(&server).generate_alternatives(&json!({}), 0).await.unwrap();
    assert!(plans.is_empty());
}

#[tokio::test]
async fn transcription_posts_multipart_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("Authorization", "Bearer stt-key"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("name=\"model\""))
        .and(body_string_contains("whisper-1"))
        .and(body_string_contains("name=\"language\""))
        .and(body_string_contains("verbose_json"))
        .and(body_string_contains("timestamp_granularities[]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "Plan the launch",
            "duration": 2.0,
            "segments": [{"start": 0.0, "end": 2.0, "text": "Plan the launch",
                          "avg_logprob": 0.0, "no_speech_prob": 0.1}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TranscriptionClient::new("stt-key".to_owned(), server.uri())
        .unwrap()
        .with_model("whisper-1".to_owned());
    let request = TranscriptionRequest::new(b"RIFF....".to_vec(), "clip.wav").with_language("en");
    let transcript = client.transcribe(&request).await.unwrap();
    assert_eq!(transcript.text, "Plan the launch");
    assert!((transcript.confidence - 0.9).abs() < 1e-9);
    assert_eq!(transcript.language.as_deref(), Some("en"));
}

#[tokio::test]
async fn transcription_text_format_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(body_string_contains("name=\"response_format\""))
        .respond_with(ResponseTemplate::new(200).set_body_string("just words"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let client = TranscriptionClient::new("k".to_owned(), server.uri()).unwrap();
    let request =
        TranscriptionRequest::new(vec![1, 2, 3], "a.mp3").with_format(TranscriptFormat::Text);
    assert_eq!(client.transcribe(&request).await.unwrap().text, "just words");

    // Exhausted mock falls through to wiremock's 404.
    let err = client.transcribe(&request).await.unwrap_err();
    assert!(matches!(err, LlmError::HttpStatus { code: 404, .. }));

    let empty = TranscriptionRequest::new(Vec::new(), "a.mp3");
    assert!(matches!(client.transcribe(&empty).await, Err(LlmError::MissingField(_))));
}

#[tokio::test]
async fn speech_returns_audio_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({"input": "hello", "voice": "nova", "response_format": "opus"})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x4f, 0x67, 0x67, 0x53]))
        .expect(1)
        .mount(&server)
        .await;

    let client = SpeechClient::new("k".to_owned(), server.uri()).unwrap();
    let speech = client.synthesize("hello", Some("nova"), SpeechFormat::Opus).await.unwrap();
    assert_eq!(speech.audio, vec![0x4f, 0x67, 0x67, 0x53]);
    assert_eq!(speech.format.content_type(), "audio/opus");

    assert!(matches!(
        client.synthesize("  ", None, SpeechFormat::Mp3).await,
        Err(LlmError::MissingField(_))
    ));
}
