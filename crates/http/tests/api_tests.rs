//! End-to-end tests against a real listener on the in-memory backend.

#![allow(clippy::unwrap_used, reason = "test code")]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;
use voiceplan_core::{FLAG_VOICE_PLAN_COMMIT, FeatureFlags, ValidationIssue};
use voiceplan_http::{AppState, ORGANIZATION_HEADER, Providers, USER_HEADER, cors_layer, create_router};
use voiceplan_llm::{
    GeneratedPlan, LlmError, PlanGenerator, PlanRequest, SpeechFormat, SpeechSynthesizer,
    SynthesizedSpeech, Transcriber, Transcript, TranscriptionRequest,
};
use voiceplan_service::{MonitoringConfig, OrchestratorConfig};
use voiceplan_storage::StorageBackend;

struct CannedPlanner;

fn plan() -> Value {
    json!({
        "title": "Office move",
        "tasks": [
            {"id": "a", "title": "Book movers", "priority": "high"},
            {"id": "b", "title": "Pack desks", "priority": "medium", "dependencies": ["a"]}
        ]
    })
}

#[async_trait]
impl PlanGenerator for CannedPlanner {
    async fn generate_plan(&self, _request: &PlanRequest) -> Result<GeneratedPlan, LlmError> {
        Ok(GeneratedPlan { plan: plan(), confidence: 0.85, model: "canned".to_owned() })
    }

    async fn generate_alternatives(&self, _plan: &Value, _count: usize) -> Result<Vec<GeneratedPlan>, LlmError> {
        Ok(Vec::new())
    }

    async fn refine_plan(&self, plan: &Value, _issues: &[ValidationIssue]) -> Result<GeneratedPlan, LlmError> {
        Ok(GeneratedPlan { plan: plan.clone(), confidence: 0.85, model: "canned".to_owned() })
    }
}

struct CannedTranscriber;

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, LlmError> {
        Ok(Transcript::plain(format!("heard {} bytes", request.audio.len())))
    }
}

struct ToneSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: Option<&str>,
        format: SpeechFormat,
    ) -> Result<SynthesizedSpeech, LlmError> {
        Ok(SynthesizedSpeech { audio: vec![0xff, 0xfb, 0x90], format })
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    user: Uuid,
    org: Uuid,
}

impl TestServer {
    async fn start(flags: FeatureFlags) -> Self {
        let providers = Providers {
            planner: Arc::new(CannedPlanner),
            transcriber: Some(Arc::new(CannedTranscriber)),
            synthesizer: Some(Arc::new(ToneSynthesizer)),
        };
        let state = Arc::new(AppState::new(
            Arc::new(StorageBackend::new_memory()),
            Arc::new(flags),
            providers,
            OrchestratorConfig::default(),
            MonitoringConfig::default(),
        ));
        let router = create_router(state, cors_layer(&[]));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            user: Uuid::new_v4(),
            org: Uuid::new_v4(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base))
            .header(USER_HEADER, self.user.to_string())
            .header(ORGANIZATION_HEADER, self.org.to_string())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .header(USER_HEADER, self.user.to_string())
            .header(ORGANIZATION_HEADER, self.org.to_string())
    }
}

#[tokio::test]
async fn health_and_readiness() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let health = server.client.get(format!("{}/health", server.base)).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");

    let ready: Value = server.get("/api/readiness").send().await.unwrap().json().await.unwrap();
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["backend"], "memory");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let resp = server.client.get(format!("{}/api/voice/sessions", server.base)).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn orchestrate_commit_and_rollback_over_http() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;

    let resp = server
        .post("/api/voice/orchestrate")
        .json(&json!({"transcript": "move the office next month"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();
    assert_eq!(result["session"]["status"], "completed");
    let id = result["session"]["id"].as_str().unwrap().to_owned();

    let dry: Value = server
        .post(&format!("/api/voice/sessions/{id}/commit"))
        .json(&json!({"mode": "dry_run"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dry["counts"]["tasks"], 2);
    assert_eq!(dry["counts"]["dependencies"], 1);

    let committed = server.post(&format!("/api/voice/sessions/{id}/commit")).json(&json!({})).send().await.unwrap();
    assert_eq!(committed.status(), 200);

    let again = server.post(&format!("/api/voice/sessions/{id}/commit")).json(&json!({})).send().await.unwrap();
    assert_eq!(again.status(), 409);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["code"], "CONFLICT");

    let rolled = server.post(&format!("/api/voice/sessions/{id}/rollback")).send().await.unwrap();
    assert_eq!(rolled.status(), 200);

    let audit: Vec<Value> = server
        .get(&format!("/api/voice/sessions/{id}/audit"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(audit.len(), 3);

    let session: Value = server.get(&format!("/api/voice/sessions/{id}")).send().await.unwrap().json().await.unwrap();
    assert_eq!(session["status"], "rolled_back");
}

#[tokio::test]
async fn commit_flag_off_is_forbidden() {
    let server = TestServer::start(FeatureFlags::all_enabled().without_flag(FLAG_VOICE_PLAN_COMMIT)).await;
    let result: Value = server
        .post("/api/voice/orchestrate")
        .json(&json!({"transcript": "move the office"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = result["session"]["id"].as_str().unwrap();
    let resp = server.post(&format!("/api/voice/sessions/{id}/commit")).json(&json!({})).send().await.unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "FEATURE_DISABLED");
}

#[tokio::test]
async fn session_lifecycle_and_isolation() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let resp = server.post("/api/voice/sessions").send().await.unwrap();
    assert_eq!(resp.status(), 201);
    let session: Value = resp.json().await.unwrap();
    assert_eq!(session["language"], "en");
    let id = session["id"].as_str().unwrap();

    let capture: Value =
        server.post(&format!("/api/voice/sessions/{id}/capture")).send().await.unwrap().json().await.unwrap();
    assert_eq!(capture["status"], "recording");

    let listed: Vec<Value> = server.get("/api/voice/sessions?limit=5").send().await.unwrap().json().await.unwrap();
    assert_eq!(listed.len(), 1);

    let stranger = server
        .client
        .get(format!("{}/api/voice/sessions/{id}", server.base))
        .header(USER_HEADER, Uuid::new_v4().to_string())
        .header(ORGANIZATION_HEADER, Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(stranger.status(), 404);

    let cancelled: Value =
        server.post(&format!("/api/voice/sessions/{id}/cancel")).send().await.unwrap().json().await.unwrap();
    assert_eq!(cancelled["status"], "failed");
}

#[tokio::test]
async fn multipart_transcribe_and_orchestrate() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let part = || reqwest::multipart::Part::bytes(vec![7_u8; 32]).file_name("memo.webm").mime_str("audio/webm").unwrap();

    let form = reqwest::multipart::Form::new().part("file", part()).text("language", "en");
    let transcript: Value =
        server.post("/api/voice/transcribe").multipart(form).send().await.unwrap().json().await.unwrap();
    assert_eq!(transcript["text"], "heard 32 bytes");

    let form = reqwest::multipart::Form::new().part("file", part()).text("alternatives", "0");
    let resp = server.post("/api/voice/orchestrate").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();
    assert_eq!(result["session"]["transcript"], "heard 32 bytes");

    let form = reqwest::multipart::Form::new().text("language", "en");
    let resp = server.post("/api/voice/transcribe").multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn validate_and_pii_endpoints() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let report: Value = server
        .post("/api/plans/validate")
        .json(&json!({"plan": {"title": "x", "tasks": []}, "dry_run": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["is_valid"], false);
    assert!(report["errors"].as_array().unwrap().iter().any(|e| e["code"] == "NO_TASKS"));

    let redacted: Value = server
        .post("/api/pii/redact")
        .json(&json!({"text": "mail ana@example.com"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(redacted["text"], "mail [REDACTED_EMAIL]");

    let scan: Value =
        server.post("/api/pii/scan").json(&json!({"text": "nothing here"})).send().await.unwrap().json().await.unwrap();
    assert_eq!(scan["total"], 0);
}

#[tokio::test]
async fn oversized_pii_text_is_rejected() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let text = "a".repeat(voiceplan_core::pii::MAX_SCAN_INPUT_BYTES + 1);
    let resp = server.post("/api/pii/redact").json(&json!({"text": text})).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("maximum"));
}

#[tokio::test]
async fn speech_returns_audio_bytes() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    let resp = server
        .post("/api/voice/speech")
        .json(&json!({"text": "Your plan has two tasks", "format": "wav"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "audio/wav");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &[0xff, 0xfb, 0x90]);

    let bad = server.post("/api/voice/speech").json(&json!({"text": "x", "format": "midi"})).send().await.unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn monitoring_reflects_orchestrations() {
    let server = TestServer::start(FeatureFlags::all_enabled()).await;
    server.post("/api/voice/orchestrate").json(&json!({"transcript": "plan"})).send().await.unwrap();

    let dashboard: Value =
        server.get("/api/monitoring/dashboard?window_hours=1").send().await.unwrap().json().await.unwrap();
    assert_eq!(dashboard["total_sessions"], 1);
    assert_eq!(dashboard["window_hours"], 1);

    let status: Value = server.get("/api/monitoring/status").send().await.unwrap().json().await.unwrap();
    assert_eq!(status["overall"], "healthy");

    let alerts: Vec<Value> = server.get("/api/monitoring/alerts").send().await.unwrap().json().await.unwrap();
    assert!(alerts.is_empty());

    let missing = server.post(&format!("/api/monitoring/alerts/{}/resolve", Uuid::new_v4())).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}
