//! Fakes and a wired-up harness on the in-memory backend.

#![allow(clippy::unwrap_used, reason = "test code")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;
use voiceplan_core::{EventEnvelope, EventKind, FeatureFlags, FeatureGate, ValidationIssue};
use voiceplan_llm::{
    GeneratedPlan, LlmError, PlanGenerator, PlanRequest, Transcriber, Transcript,
    TranscriptionRequest,
};
use voiceplan_storage::{MemoryStorage, StorageBackend};

use crate::events::{EventEmitter, EventSink};
use crate::{
    Actor, CommitService, MonitoringService, Orchestrator, OrchestratorConfig, SessionService,
};

pub(crate) fn sample_plan() -> Value {
    json!({
        "title": "Website relaunch",
        "milestones": [{"id": "m1", "name": "Design"}],
        "tasks": [
            {"id": "t1", "title": "Wireframes", "priority": "high", "milestone_id": "m1", "estimated_hours": 8},
            {"id": "t2", "title": "Build pages", "priority": "medium", "dependencies": ["t1"], "estimated_hours": 16},
            {"id": "t3", "title": "Launch", "priority": "critical", "dependencies": ["t2"]}
        ]
    })
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.event).collect()
    }
}

impl EventSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(envelope.clone());
        Ok(())
    }
}

/// Plan generator returning canned plans.
pub(crate) struct FakePlanner {
    pub(crate) plan: Mutex<Result<Value, String>>,
    pub(crate) refined: Mutex<Option<Value>>,
    pub(crate) confidence: f64,
    pub(crate) generate_calls: AtomicUsize,
    pub(crate) refine_calls: AtomicUsize,
    /// When set, alternatives and refinement return provider errors.
    pub(crate) extras_fail: bool,
}

impl FakePlanner {
    pub(crate) fn returning(plan: Value) -> Self {
        Self {
            plan: Mutex::new(Ok(plan)),
            refined: Mutex::new(None),
            confidence: 0.9,
            generate_calls: AtomicUsize::new(0),
            refine_calls: AtomicUsize::new(0),
            extras_fail: false,
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        let planner = Self::returning(Value::Null);
        *planner.plan.lock().unwrap() = Err(message.to_owned());
        planner
    }

    pub(crate) fn with_refinement(self, refined: Value) -> Self {
        *self.refined.lock().unwrap() = Some(refined);
        self
    }

    pub(crate) fn with_failing_extras(mut self) -> Self {
        self.extras_fail = true;
        self
    }

    fn generated(&self, plan: Value) -> GeneratedPlan {
        GeneratedPlan { plan, confidence: self.confidence, model: "fake-model".to_owned() }
    }
}

#[async_trait]
impl PlanGenerator for FakePlanner {
    async fn generate_plan(&self, _request: &PlanRequest) -> Result<GeneratedPlan, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plan.lock().unwrap().clone();
        match plan {
            Ok(plan) => Ok(self.generated(plan)),
            Err(message) => Err(LlmError::HttpStatus { code: 500, body: message }),
        }
    }

    async fn generate_alternatives(
        &self,
        plan: &Value,
        count: usize,
    ) -> Result<Vec<GeneratedPlan>, LlmError> {
        if self.extras_fail {
            return Err(LlmError::HttpStatus { code: 503, body: "alternatives unavailable".to_owned() });
        }
        Ok((0..count)
            .map(|i| {
                let mut alt = plan.clone();
                alt["title"] = json!(format!("Alternative {}", i + 1));
                self.generated(alt)
            })
            .collect())
    }

    async fn refine_plan(
        &self,
        plan: &Value,
        _issues: &[ValidationIssue],
    ) -> Result<GeneratedPlan, LlmError> {
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        if self.extras_fail {
            return Err(LlmError::HttpStatus { code: 503, body: "refinement unavailable".to_owned() });
        }
        let refined = self.refined.lock().unwrap().clone();
        Ok(self.generated(refined.unwrap_or_else(|| plan.clone())))
    }
}

pub(crate) struct FakeTranscriber {
    pub(crate) text: String,
    pub(crate) calls: AtomicUsize,
}

impl FakeTranscriber {
    pub(crate) fn saying(text: &str) -> Self {
        Self { text: text.to_owned(), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcript, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!request.audio.is_empty());
        let mut transcript = Transcript::plain(self.text.clone());
        transcript.language = request.language.clone();
        Ok(transcript)
    }
}

pub(crate) struct Harness {
    pub(crate) actor: Actor,
    pub(crate) memory: MemoryStorage,
    pub(crate) storage: Arc<StorageBackend>,
    pub(crate) sink: Arc<RecordingSink>,
    pub(crate) monitoring: Arc<MonitoringService>,
    pub(crate) sessions: SessionService,
    pub(crate) commits: CommitService,
    pub(crate) orchestrator: Orchestrator,
}

impl Harness {
    pub(crate) fn new(
        flags: FeatureFlags,
        planner: Arc<dyn PlanGenerator>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        let memory = MemoryStorage::new();
        let storage = Arc::new(StorageBackend::Memory(memory.clone()));
        let sink = Arc::new(RecordingSink::default());
        let events = Arc::new(EventEmitter::new(vec![sink.clone()]));
        let flags: Arc<dyn FeatureGate> = Arc::new(flags);
        let monitoring = Arc::new(MonitoringService::default());
        let config = OrchestratorConfig { plan_cache_ttl: Duration::from_secs(60), ..OrchestratorConfig::default() };
        Self {
            actor: Actor::new(Uuid::new_v4(), Uuid::new_v4()),
            sessions: SessionService::new(storage.clone(), flags.clone(), events.clone()),
            commits: CommitService::new(storage.clone(), flags.clone(), events.clone()),
            orchestrator: Orchestrator::new(
                storage.clone(),
                flags,
                planner,
                transcriber,
                monitoring.clone(),
                events,
                config,
            ),
            memory,
            storage,
            sink,
            monitoring,
        }
    }

    pub(crate) fn with_plan(flags: FeatureFlags, plan: Value) -> Self {
        Self::new(flags, Arc::new(FakePlanner::returning(plan)), None)
    }
}
