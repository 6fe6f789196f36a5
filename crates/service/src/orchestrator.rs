//! Voice-to-plan pipeline: transcribe → generate → validate → completed.
//!
//! Stages run strictly in sequence. Every transition is persisted and emitted
//! as a lifecycle event before the next stage starts. Commit is a separate,
//! explicit call on [`crate::CommitService`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;
use voiceplan_core::constants::DEFAULT_ORCHESTRATOR_MAX_TASKS;
use voiceplan_core::env_config::env_parse_with_default;
use voiceplan_core::pii::redact_for_log;
use voiceplan_core::{
    EventKind, FLAG_VOICE_PLAN_ALTERNATIVES, FLAG_VOICE_PLAN_REFINEMENT, FLAG_VOICE_PLANNING,
    FLAG_VOICE_TRANSCRIPTION, FeatureGate, PipelineStage, SessionStatus, TaskPriority, TtlCache,
    ValidationContext, ValidationIssue, ValidationOptions, ValidationReport, VoiceSession,
    validate_plan,
};
use voiceplan_llm::{
    GeneratedPlan, PlanGenerator, PlanOptions, PlanRequest, Transcriber, Transcript,
    TranscriptFormat, TranscriptionRequest,
};
use voiceplan_storage::StorageBackend;
use voiceplan_storage::traits::SessionStore;

use crate::events::{EventChain, EventEmitter};
use crate::monitoring::MonitoringService;
use crate::session_service::{load_session, require_flag};
use crate::{Actor, ServiceError};

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Structural gate: plans with more tasks are rejected.
    pub max_tasks: usize,
    /// Reconciler confidence below which auto-refinement kicks in.
    pub refine_threshold: f64,
    /// Zero disables the plan cache.
    pub plan_cache_ttl: Duration,
    pub max_alternatives: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_ORCHESTRATOR_MAX_TASKS,
            refine_threshold: 0.6,
            plan_cache_ttl: Duration::from_secs(300),
            max_alternatives: 3,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_tasks: env_parse_with_default("VOICEPLAN_MAX_TASKS", d.max_tasks).max(1),
            refine_threshold: env_parse_with_default("VOICEPLAN_REFINE_THRESHOLD", d.refine_threshold)
                .clamp(0.0, 1.0),
            plan_cache_ttl: Duration::from_secs(env_parse_with_default(
                "VOICEPLAN_PLAN_CACHE_TTL_SECS",
                d.plan_cache_ttl.as_secs(),
            )),
            max_alternatives: d.max_alternatives,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub format: Option<TranscriptFormat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationOptions {
    /// Number of alternative plans to request (best effort).
    #[serde(default)]
    pub alternatives: usize,
    /// Ask the provider to fix validation issues (best effort).
    #[serde(default)]
    pub auto_refine: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestrationRequest {
    /// Resume an existing `initializing` or `recording` session.
    pub session_id: Option<Uuid>,
    pub language: Option<String>,
    pub audio: Option<AudioInput>,
    /// Used when no audio is supplied.
    pub transcript: Option<String>,
    pub context: Option<Value>,
    pub options: OrchestrationOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub total_ms: u64,
    pub stages: BTreeMap<PipelineStage, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationResult {
    pub session: VoiceSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    pub plan: GeneratedPlan,
    pub validation: ValidationReport,
    pub alternatives: Vec<GeneratedPlan>,
    pub refined: bool,
    pub from_cache: bool,
    pub timings: StageTimings,
    pub correlation_id: Uuid,
}

struct PipelineOutput {
    transcript: Option<Transcript>,
    plan: GeneratedPlan,
    validation: ValidationReport,
    alternatives: Vec<GeneratedPlan>,
    refined: bool,
    from_cache: bool,
}

type StageResult<T> = Result<T, (PipelineStage, ServiceError)>;

pub struct Orchestrator {
    storage: Arc<StorageBackend>,
    flags: Arc<dyn FeatureGate>,
    planner: Arc<dyn PlanGenerator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    monitoring: Arc<MonitoringService>,
    events: Arc<EventEmitter>,
    plan_cache: TtlCache<String, GeneratedPlan>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        storage: Arc<StorageBackend>,
        flags: Arc<dyn FeatureGate>,
        planner: Arc<dyn PlanGenerator>,
        transcriber: Option<Arc<dyn Transcriber>>,
        monitoring: Arc<MonitoringService>,
        events: Arc<EventEmitter>,
        config: OrchestratorConfig,
    ) -> Self {
        let plan_cache = TtlCache::new(config.plan_cache_ttl);
        Self { storage, flags, planner, transcriber, monitoring, events, plan_cache, config }
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn orchestrate(
        &self,
        actor: &Actor,
        request: OrchestrationRequest,
    ) -> Result<OrchestrationResult, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_PLANNING, actor)?;
        let typed = request.transcript.as_deref().map(str::trim).filter(|t| !t.is_empty());
        match &request.audio {
            Some(audio) => {
                require_flag(self.flags.as_ref(), FLAG_VOICE_TRANSCRIPTION, actor)?;
                if audio.bytes.is_empty() {
                    return Err(ServiceError::InvalidInput("audio upload is empty".to_owned()));
                }
            },
            None if typed.is_none() => {
                return Err(ServiceError::InvalidInput(
                    "either audio or a transcript is required".to_owned(),
                ));
            },
            None => {},
        }

        let started = Instant::now();
        let mut chain = self.events.chain(*actor, request.session_id);
        let mut session = match request.session_id {
            Some(id) => {
                let session = load_session(&self.storage, actor, id).await?;
                if !session.status.accepts_orchestration() {
                    return Err(ServiceError::InvalidState(format!(
                        "session in status {} cannot be orchestrated",
                        session.status
                    )));
                }
                session
            },
            None => {
                let language = request.language.as_deref().unwrap_or("en");
                let session = VoiceSession::new(actor.organization_id, actor.user_id, language);
                self.storage.save_session(&session).await?;
                chain.set_session(session.id);
                chain.emit(EventKind::SessionCreated, json!({"language": session.language}));
                session
            },
        };
        if let Some(language) = request.language.as_deref().filter(|l| !l.trim().is_empty()) {
            language.trim().clone_into(&mut session.language);
        }

        let mut stages = BTreeMap::new();
        let result = self.run_pipeline(actor, &mut session, &request, &mut chain, &mut stages).await;
        let total_ms = elapsed_ms(started);
        match result {
            Ok(output) => {
                self.monitoring.track_session_metrics(session.id, total_ms, stages.clone(), true);
                tracing::info!(session_id = %session.id, total_ms, "orchestration completed");
                Ok(OrchestrationResult {
                    session,
                    transcript: output.transcript,
                    plan: output.plan,
                    validation: output.validation,
                    alternatives: output.alternatives,
                    refined: output.refined,
                    from_cache: output.from_cache,
                    timings: StageTimings { total_ms, stages },
                    correlation_id: chain.correlation_id(),
                })
            },
            Err((stage, err)) => {
                self.record_failure(&mut session, stage, &err, &mut chain).await;
                self.monitoring.track_session_metrics(session.id, total_ms, stages, false);
                Err(err)
            },
        }
    }

    /// Standalone transcription, outside any session.
    pub async fn transcribe(
        &self,
        actor: &Actor,
        audio: &AudioInput,
        language: Option<&str>,
    ) -> Result<Transcript, ServiceError> {
        require_flag(self.flags.as_ref(), FLAG_VOICE_TRANSCRIPTION, actor)?;
        if audio.bytes.is_empty() {
            return Err(ServiceError::InvalidInput("audio upload is empty".to_owned()));
        }
        let started = Instant::now();
        match self.transcribe_audio(audio, language).await {
            Ok(transcript) => {
                self.monitoring.track_transcription_completion(
                    None,
                    elapsed_ms(started),
                    transcript.confidence,
                );
                Ok(transcript)
            },
            Err(e) => {
                self.monitoring.track_session_failure(None, PipelineStage::Transcription, &e.to_string());
                Err(e)
            },
        }
    }

    async fn run_pipeline(
        &self,
        actor: &Actor,
        session: &mut VoiceSession,
        request: &OrchestrationRequest,
        chain: &mut EventChain<'_>,
        stages: &mut BTreeMap<PipelineStage, u64>,
    ) -> StageResult<PipelineOutput> {
        let first_stage =
            if request.audio.is_some() { PipelineStage::Transcription } else { PipelineStage::PlanGeneration };
        self.advance(session, SessionStatus::Processing, chain).await.map_err(|e| (first_stage, e))?;

        // Transcription
        let transcript = match &request.audio {
            Some(audio) => {
                let stage = PipelineStage::Transcription;
                self.advance(session, SessionStatus::Transcribing, chain).await.map_err(|e| (stage, e))?;
                let started = Instant::now();
                let transcript =
                    self.transcribe_audio(audio, Some(&session.language)).await.map_err(|e| (stage, e))?;
                let ms = elapsed_ms(started);
                stages.insert(stage, ms);
                self.monitoring.track_transcription_completion(Some(session.id), ms, transcript.confidence);
                session.transcript = Some(transcript.text.clone());
                session.transcript_confidence = Some(transcript.confidence);
                tracing::debug!(
                    session_id = %session.id,
                    transcript = %redact_for_log(&transcript.text),
                    "transcript received"
                );
                chain.emit(
                    EventKind::TranscriptionCompleted,
                    json!({
                        "confidence": transcript.confidence,
                        "characters": transcript.text.chars().count(),
                        "segments": transcript.segments.len(),
                        "duration_secs": transcript.duration_secs,
                        "latency_ms": ms,
                    }),
                );
                Some(transcript)
            },
            None => {
                session.transcript =
                    request.transcript.as_deref().map(str::trim).map(str::to_owned);
                None
            },
        };
        let text = session.transcript.clone().unwrap_or_default();

        // Plan generation
        let stage = PipelineStage::PlanGeneration;
        self.advance(session, SessionStatus::Generating, chain).await.map_err(|e| (stage, e))?;
        let plan_request = PlanRequest {
            transcript: text,
            context: request.context.clone(),
            options: PlanOptions {
                max_tasks: self.config.max_tasks,
                language: Some(session.language.clone()),
            },
        };
        let started = Instant::now();
        let (mut plan, from_cache) = self.generate(&plan_request).await.map_err(|e| (stage, e))?;
        let ms = elapsed_ms(started);
        stages.insert(stage, ms);
        self.monitoring.track_plan_generation_completion(session.id, ms, plan.confidence);
        chain.emit(
            EventKind::PlanGenerated,
            json!({
                "confidence": plan.confidence,
                "model": plan.model,
                "tasks": task_count(&plan.plan),
                "cached": from_cache,
                "latency_ms": ms,
            }),
        );

        // Validation, with optional refinement
        let stage = PipelineStage::Validation;
        self.advance(session, SessionStatus::Validating, chain).await.map_err(|e| (stage, e))?;
        let started = Instant::now();
        let mut validation = reconcile(&plan.plan, actor);
        let mut refined = false;
        if request.options.auto_refine
            && self.flags.is_enabled(FLAG_VOICE_PLAN_REFINEMENT, &actor.flag_context())
            && (!validation.is_valid || validation.confidence < self.config.refine_threshold)
        {
            let refine_started = Instant::now();
            if let Some((candidate, report)) = self.try_refine(&plan, &validation, actor).await {
                plan = candidate;
                validation = report;
                refined = true;
            }
            stages.insert(PipelineStage::Refinement, elapsed_ms(refine_started));
        }
        let problems = structural_check(&plan.plan, self.config.max_tasks);
        if !problems.is_empty() {
            return Err((stage, ServiceError::validation(problems.join("; "), Some(validation))));
        }
        stages.insert(stage, elapsed_ms(started));
        session.plan_json = Some(plan.plan.clone());
        session.plan_confidence = Some(plan.confidence);
        chain.emit(
            EventKind::PlanValidated,
            json!({
                "is_valid": validation.is_valid,
                "confidence": validation.confidence,
                "errors": validation.errors.len(),
                "warnings": validation.warnings.len(),
                "conflicts": validation.conflicts.len(),
                "refined": refined,
            }),
        );

        let alternatives = self.alternatives(actor, &plan, request.options.alternatives, stages).await;

        self.advance(session, SessionStatus::Completed, chain).await.map_err(|e| (stage, e))?;
        Ok(PipelineOutput { transcript, plan, validation, alternatives, refined, from_cache })
    }

    async fn advance(
        &self,
        session: &mut VoiceSession,
        next: SessionStatus,
        chain: &mut EventChain<'_>,
    ) -> Result<(), ServiceError> {
        let from = session.status;
        session.transition(next)?;
        self.storage.save_session(session).await?;
        chain.emit(EventKind::SessionStatusChanged, json!({"from": from, "to": next}));
        tracing::debug!(session_id = %session.id, from = %from, to = %next, "session status changed");
        Ok(())
    }

    async fn record_failure(
        &self,
        session: &mut VoiceSession,
        stage: PipelineStage,
        err: &ServiceError,
        chain: &mut EventChain<'_>,
    ) {
        let message = err.to_string();
        self.monitoring.track_session_failure(Some(session.id), stage, &message);
        if session.fail(message.clone()).is_err() {
            return;
        }
        if let Err(e) = self.storage.save_session(session).await {
            tracing::error!(session_id = %session.id, error = %e, "failed to persist session failure");
        }
        chain.emit(
            EventKind::SessionFailed,
            json!({"stage": stage, "code": err.code(), "error": message}),
        );
    }

    async fn transcribe_audio(
        &self,
        audio: &AudioInput,
        language: Option<&str>,
    ) -> Result<Transcript, ServiceError> {
        let Some(transcriber) = &self.transcriber else {
            return Err(ServiceError::TranscriptionFailed(
                "no speech-to-text provider configured".to_owned(),
            ));
        };
        let mut request = TranscriptionRequest::new(audio.bytes.clone(), audio.file_name.clone())
            .with_format(audio.format.unwrap_or_default());
        request.mime_type.clone_from(&audio.mime_type);
        request.language = language.map(str::to_owned);
        let transcript = transcriber
            .transcribe(&request)
            .await
            .map_err(|e| ServiceError::TranscriptionFailed(e.to_string()))?;
        if transcript.text.trim().is_empty() {
            return Err(ServiceError::TranscriptionFailed(
                "provider returned an empty transcript".to_owned(),
            ));
        }
        Ok(transcript)
    }

    async fn generate(&self, request: &PlanRequest) -> Result<(GeneratedPlan, bool), ServiceError> {
        let caching = !self.config.plan_cache_ttl.is_zero();
        let key = request.cache_key();
        if caching {
            if let Some(hit) = self.plan_cache.get(&key) {
                tracing::debug!("plan cache hit");
                return Ok((hit, true));
            }
        }
        let generated = self
            .planner
            .generate_plan(request)
            .await
            .map_err(|e| ServiceError::PlanGenerationFailed(e.to_string()))?;
        if !generated.plan.is_object() {
            return Err(ServiceError::PlanGenerationFailed(
                "provider returned a plan that is not a JSON object".to_owned(),
            ));
        }
        if caching {
            self.plan_cache.insert(key, generated.clone());
        }
        Ok((generated, false))
    }

    /// Best effort: a refinement is adopted only when it validates better.
    async fn try_refine(
        &self,
        plan: &GeneratedPlan,
        current: &ValidationReport,
        actor: &Actor,
    ) -> Option<(GeneratedPlan, ValidationReport)> {
        let issues: Vec<ValidationIssue> =
            current.errors.iter().chain(&current.warnings).cloned().collect();
        match self.planner.refine_plan(&plan.plan, &issues).await {
            Ok(candidate) => {
                let report = reconcile(&candidate.plan, actor);
                let better = report.errors.len() < current.errors.len()
                    || (report.errors.len() == current.errors.len()
                        && report.confidence > current.confidence);
                if better {
                    tracing::info!(
                        before = current.confidence,
                        after = report.confidence,
                        "refined plan adopted"
                    );
                    Some((candidate, report))
                } else {
                    tracing::debug!("refined plan did not improve validation, keeping original");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "plan refinement failed, keeping original plan");
                None
            },
        }
    }

    async fn alternatives(
        &self,
        actor: &Actor,
        plan: &GeneratedPlan,
        requested: usize,
        stages: &mut BTreeMap<PipelineStage, u64>,
    ) -> Vec<GeneratedPlan> {
        if requested == 0
            || !self.flags.is_enabled(FLAG_VOICE_PLAN_ALTERNATIVES, &actor.flag_context())
        {
            return Vec::new();
        }
        let started = Instant::now();
        let count = requested.min(self.config.max_alternatives);
        let result = match self.planner.generate_alternatives(&plan.plan, count).await {
            Ok(mut alternatives) => {
                alternatives.truncate(count);
                alternatives
            },
            Err(e) => {
                tracing::warn!(error = %e, "alternative plan generation failed");
                Vec::new()
            },
        };
        stages.insert(PipelineStage::Alternatives, elapsed_ms(started));
        result
    }
}

fn reconcile(plan: &Value, actor: &Actor) -> ValidationReport {
    let context = ValidationContext {
        organization_id: Some(actor.organization_id),
        user_id: Some(actor.user_id),
    };
    validate_plan(plan, &context, &ValidationOptions::default())
}

fn task_count(plan: &Value) -> usize {
    plan.get("tasks").and_then(Value::as_array).map_or(0, Vec::len)
}

fn non_blank_str(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty())
}

/// Final gate before `completed`, independent of the reconciler's rule set.
#[must_use]
pub fn structural_check(plan: &Value, max_tasks: usize) -> Vec<String> {
    let mut problems = Vec::new();
    if !plan.is_object() {
        problems.push("plan must be a JSON object".to_owned());
        return problems;
    }
    let project_name = plan.get("project").and_then(|p| p.get("name"));
    if !non_blank_str(plan.get("title")) && !non_blank_str(project_name) {
        problems.push("plan title is required".to_owned());
    }
    let tasks = plan.get("tasks").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    if tasks.is_empty() {
        problems.push("plan needs at least one task".to_owned());
    }
    if tasks.len() > max_tasks {
        problems.push(format!("plan has {} tasks, the maximum is {max_tasks}", tasks.len()));
    }
    for (i, task) in tasks.iter().enumerate() {
        if !non_blank_str(task.get("title")) {
            problems.push(format!("tasks[{i}] is missing a title"));
        }
        let priority_ok = task
            .get("priority")
            .and_then(Value::as_str)
            .is_some_and(|p| p.parse::<TaskPriority>().is_ok());
        if !priority_ok {
            problems.push(format!(
                "tasks[{i}] priority must be one of {}",
                TaskPriority::ALL_VARIANTS_STR
            ));
        }
    }
    problems
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
