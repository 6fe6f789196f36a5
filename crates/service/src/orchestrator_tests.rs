#![allow(clippy::unwrap_used, reason = "test code")]

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use voiceplan_core::{
    EventKind, FLAG_VOICE_PLAN_ALTERNATIVES, FLAG_VOICE_PLANNING, FLAG_VOICE_TRANSCRIPTION,
    FeatureFlags, PipelineStage, SessionStatus,
};
use voiceplan_storage::traits::SessionStore;

use crate::orchestrator::structural_check;
use crate::test_support::{FakePlanner, FakeTranscriber, Harness, sample_plan};
use crate::{AudioInput, OrchestrationOptions, OrchestrationRequest};

fn typed(text: &str) -> OrchestrationRequest {
    OrchestrationRequest { transcript: Some(text.to_owned()), ..OrchestrationRequest::default() }
}

fn audio() -> AudioInput {
    AudioInput {
        bytes: vec![1, 2, 3, 4],
        file_name: "memo.webm".to_owned(),
        mime_type: Some("audio/webm".to_owned()),
        format: None,
    }
}

#[tokio::test]
async fn typed_transcript_runs_to_completed() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let result = h.orchestrator.orchestrate(&h.actor, typed("plan the relaunch")).await.unwrap();

    assert_eq!(result.session.status, SessionStatus::Completed);
    assert!(result.session.completed_at.is_some());
    assert!(result.validation.is_valid);
    assert!(!result.from_cache);
    assert!(result.transcript.is_none());
    assert!(result.timings.stages.contains_key(&PipelineStage::PlanGeneration));
    assert!(result.timings.stages.contains_key(&PipelineStage::Validation));
    assert!(!result.timings.stages.contains_key(&PipelineStage::Transcription));

    let stored = h.storage.get_session(result.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.transcript.as_deref(), Some("plan the relaunch"));
    assert_eq!(stored.plan_json, Some(sample_plan()));
    assert_eq!(stored.plan_confidence, Some(0.9));
}

#[tokio::test]
async fn lifecycle_events_share_correlation_and_chain_causation() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let result = h.orchestrator.orchestrate(&h.actor, typed("plan the relaunch")).await.unwrap();

    assert_eq!(
        h.sink.kinds(),
        vec![
            EventKind::SessionCreated,
            EventKind::SessionStatusChanged,
            EventKind::SessionStatusChanged,
            EventKind::PlanGenerated,
            EventKind::SessionStatusChanged,
            EventKind::PlanValidated,
            EventKind::SessionStatusChanged,
        ]
    );
    let events = h.sink.events();
    assert!(events.iter().all(|e| e.correlation_id == Some(result.correlation_id)));
    assert!(events.iter().all(|e| e.session_id == Some(result.session.id)));
    assert_eq!(events[0].causation_id, None);
    for pair in events.windows(2) {
        assert_eq!(pair[1].causation_id, Some(pair[0].id));
    }
    assert_eq!(events.last().unwrap().payload["to"], "completed");
}

#[tokio::test]
async fn audio_goes_through_transcription() {
    let transcriber = Arc::new(FakeTranscriber::saying("call the printer on monday"));
    let h = Harness::new(
        FeatureFlags::all_enabled(),
        Arc::new(FakePlanner::returning(sample_plan())),
        Some(transcriber.clone()),
    );
    let request = OrchestrationRequest {
        audio: Some(audio()),
        language: Some("de".to_owned()),
        ..OrchestrationRequest::default()
    };
    let result = h.orchestrator.orchestrate(&h.actor, request).await.unwrap();

    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    let transcript = result.transcript.unwrap();
    assert_eq!(transcript.text, "call the printer on monday");
    assert_eq!(transcript.language.as_deref(), Some("de"));
    assert_eq!(result.session.transcript.as_deref(), Some("call the printer on monday"));
    assert_eq!(result.session.language, "de");
    assert!(result.timings.stages.contains_key(&PipelineStage::Transcription));
    assert!(h.sink.kinds().contains(&EventKind::TranscriptionCompleted));
    assert_eq!(h.monitoring.dashboard(24).transcription.count, 1);
}

#[tokio::test]
async fn disabled_planning_flag_creates_nothing() {
    let h = Harness::with_plan(FeatureFlags::disabled(), sample_plan());
    let err = h.orchestrator.orchestrate(&h.actor, typed("anything")).await.unwrap_err();
    assert_eq!(err.code(), "FEATURE_DISABLED");
    assert!(h.storage.list_sessions(h.actor.organization_id, 10).await.unwrap().is_empty());
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn audio_needs_transcription_flag() {
    let flags = FeatureFlags::disabled().with_flag(FLAG_VOICE_PLANNING);
    let h = Harness::new(
        flags,
        Arc::new(FakePlanner::returning(sample_plan())),
        Some(Arc::new(FakeTranscriber::saying("x"))),
    );
    let request = OrchestrationRequest { audio: Some(audio()), ..OrchestrationRequest::default() };
    let err = h.orchestrator.orchestrate(&h.actor, request).await.unwrap_err();
    assert!(matches!(err, crate::ServiceError::FeatureDisabled(FLAG_VOICE_TRANSCRIPTION)));
}

#[tokio::test]
async fn blank_input_is_rejected() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let err = h.orchestrator.orchestrate(&h.actor, typed("   ")).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn missing_transcriber_fails_the_session() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let request = OrchestrationRequest { audio: Some(audio()), ..OrchestrationRequest::default() };
    let err = h.orchestrator.orchestrate(&h.actor, request).await.unwrap_err();
    assert_eq!(err.code(), "TRANSCRIPTION_FAILED");

    let sessions = h.storage.list_sessions(h.actor.organization_id, 10).await.unwrap();
    assert_eq!(sessions[0].status, SessionStatus::Failed);
    assert!(sessions[0].error_message.as_deref().unwrap().contains("speech-to-text"));
}

#[tokio::test]
async fn provider_failure_fails_session_and_records_metrics() {
    let h = Harness::new(
        FeatureFlags::all_enabled(),
        Arc::new(FakePlanner::failing("model overloaded")),
        None,
    );
    let err = h.orchestrator.orchestrate(&h.actor, typed("plan it")).await.unwrap_err();
    assert_eq!(err.code(), "PLAN_GENERATION_FAILED");

    let sessions = h.storage.list_sessions(h.actor.organization_id, 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Failed);

    let failed = h.sink.events().into_iter().find(|e| e.event == EventKind::SessionFailed).unwrap();
    assert_eq!(failed.payload["stage"], "plan_generation");
    assert_eq!(failed.payload["code"], "PLAN_GENERATION_FAILED");

    let dashboard = h.monitoring.dashboard(24);
    assert_eq!(dashboard.total_sessions, 1);
    assert_eq!(dashboard.failed_sessions, 1);
    assert_eq!(dashboard.failures_by_stage.get(&PipelineStage::PlanGeneration), Some(&1));
}

#[tokio::test]
async fn plan_without_tasks_fails_structural_gate() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), json!({"title": "Empty", "tasks": []}));
    let err = h.orchestrator.orchestrate(&h.actor, typed("plan nothing")).await.unwrap_err();
    match err {
        crate::ServiceError::ValidationFailed { message, report } => {
            assert!(message.contains("at least one task"));
            assert!(report.is_some());
        },
        other => panic!("unexpected error: {other}"),
    }
    let sessions = h.storage.list_sessions(h.actor.organization_id, 10).await.unwrap();
    assert_eq!(sessions[0].status, SessionStatus::Failed);
}

#[tokio::test]
async fn reconciler_errors_do_not_block_completion() {
    let mut plan = sample_plan();
    plan["tasks"][2]["dependencies"] = json!(["nope"]);
    let h = Harness::with_plan(FeatureFlags::all_enabled(), plan);
    let result = h.orchestrator.orchestrate(&h.actor, typed("plan it")).await.unwrap();
    assert_eq!(result.session.status, SessionStatus::Completed);
    assert!(!result.validation.is_valid);
    assert!(result.validation.errors.iter().any(|e| e.code == "UNKNOWN_DEPENDENCY"));
    assert!(!result.refined);
}

#[tokio::test]
async fn refinement_is_adopted_when_it_validates_better() {
    let mut broken = sample_plan();
    broken["tasks"][2]["dependencies"] = json!(["nope"]);
    let planner = Arc::new(FakePlanner::returning(broken).with_refinement(sample_plan()));
    let h = Harness::new(FeatureFlags::all_enabled(), planner.clone(), None);
    let request = OrchestrationRequest {
        options: OrchestrationOptions { auto_refine: true, alternatives: 0 },
        ..typed("plan it")
    };
    let result = h.orchestrator.orchestrate(&h.actor, request).await.unwrap();
    assert_eq!(planner.refine_calls.load(Ordering::SeqCst), 1);
    assert!(result.refined);
    assert!(result.validation.is_valid);
    assert_eq!(result.session.plan_json, Some(sample_plan()));
    assert!(result.timings.stages.contains_key(&PipelineStage::Refinement));
}

#[tokio::test]
async fn refinement_is_skipped_for_clean_plans() {
    let planner = Arc::new(FakePlanner::returning(sample_plan()));
    let h = Harness::new(FeatureFlags::all_enabled(), planner.clone(), None);
    let request = OrchestrationRequest {
        options: OrchestrationOptions { auto_refine: true, alternatives: 0 },
        ..typed("plan it")
    };
    let result = h.orchestrator.orchestrate(&h.actor, request).await.unwrap();
    assert_eq!(planner.refine_calls.load(Ordering::SeqCst), 0);
    assert!(!result.refined);
}

#[tokio::test]
async fn refinement_and_alternative_failures_do_not_fail_the_session() {
    let mut broken = sample_plan();
    broken["tasks"][2]["dependencies"] = json!(["nope"]);
    let planner = Arc::new(FakePlanner::returning(broken.clone()).with_failing_extras());
    let h = Harness::new(FeatureFlags::all_enabled(), planner.clone(), None);
    let request = OrchestrationRequest {
        options: OrchestrationOptions { auto_refine: true, alternatives: 2 },
        ..typed("plan it")
    };
    let result = h.orchestrator.orchestrate(&h.actor, request).await.unwrap();
    assert_eq!(planner.refine_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.session.status, SessionStatus::Completed);
    assert!(!result.refined);
    assert!(result.alternatives.is_empty());
    assert_eq!(result.session.plan_json, Some(broken));
    assert!(!h.sink.kinds().contains(&EventKind::SessionFailed));
}

#[tokio::test]
async fn alternative_failure_keeps_a_clean_plan_completed() {
    let planner = Arc::new(FakePlanner::returning(sample_plan()).with_failing_extras());
    let h = Harness::new(FeatureFlags::all_enabled(), planner, None);
    let request = OrchestrationRequest {
        options: OrchestrationOptions { auto_refine: false, alternatives: 3 },
        ..typed("plan it")
    };
    let result = h.orchestrator.orchestrate(&h.actor, request).await.unwrap();
    assert_eq!(result.session.status, SessionStatus::Completed);
    assert!(result.validation.is_valid);
    assert!(result.alternatives.is_empty());
    assert!(!result.refined);
}

#[tokio::test]
async fn identical_requests_hit_the_plan_cache() {
    let planner = Arc::new(FakePlanner::returning(sample_plan()));
    let h = Harness::new(FeatureFlags::all_enabled(), planner.clone(), None);
    let first = h.orchestrator.orchestrate(&h.actor, typed("plan it")).await.unwrap();
    let second = h.orchestrator.orchestrate(&h.actor, typed("plan it ")).await.unwrap();
    assert_eq!(planner.generate_calls.load(Ordering::SeqCst), 1);
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_ne!(first.session.id, second.session.id);
}

#[tokio::test]
async fn alternatives_are_capped_and_flag_gated() {
    let request = || OrchestrationRequest {
        options: OrchestrationOptions { alternatives: 10, auto_refine: false },
        ..typed("plan it")
    };
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let result = h.orchestrator.orchestrate(&h.actor, request()).await.unwrap();
    assert_eq!(result.alternatives.len(), h.orchestrator.config().max_alternatives);

    let flags = FeatureFlags::all_enabled().without_flag(FLAG_VOICE_PLAN_ALTERNATIVES);
    let h = Harness::with_plan(flags, sample_plan());
    let result = h.orchestrator.orchestrate(&h.actor, request()).await.unwrap();
    assert!(result.alternatives.is_empty());
}

#[tokio::test]
async fn resumes_a_recording_session_but_not_a_completed_one() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let session = h.sessions.create_session(&h.actor, Some("fr")).await.unwrap();
    h.sessions.start_capture(&h.actor, session.id).await.unwrap();

    let request = OrchestrationRequest { session_id: Some(session.id), ..typed("plan it") };
    let result = h.orchestrator.orchestrate(&h.actor, request.clone()).await.unwrap();
    assert_eq!(result.session.id, session.id);
    assert_eq!(result.session.language, "fr");

    let err = h.orchestrator.orchestrate(&h.actor, request).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn foreign_session_reads_as_not_found() {
    let h = Harness::with_plan(FeatureFlags::all_enabled(), sample_plan());
    let session = h.sessions.create_session(&h.actor, None).await.unwrap();
    let stranger = crate::Actor::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4());
    let request = OrchestrationRequest { session_id: Some(session.id), ..typed("plan it") };
    let err = h.orchestrator.orchestrate(&stranger, request).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn structural_check_reports_each_problem() {
    assert!(structural_check(&sample_plan(), 100).is_empty());
    assert!(structural_check(&json!({"project": {"name": "P"}, "tasks": [{"title": "a", "priority": "low"}]}), 100).is_empty());

    let problems = structural_check(
        &json!({"tasks": [{"title": " ", "priority": "urgent"}, {"title": "ok", "priority": "low"}]}),
        1,
    );
    assert_eq!(problems.len(), 4, "{problems:?}");
    assert!(problems.iter().any(|p| p.contains("title is required")));
    assert!(problems.iter().any(|p| p.contains("maximum is 1")));
    assert!(problems.iter().any(|p| p.contains("tasks[0] is missing a title")));
    assert!(problems.iter().any(|p| p.contains("low|medium|high|critical")));

    assert_eq!(structural_check(&json!([1, 2]), 10), vec!["plan must be a JSON object".to_owned()]);
}
