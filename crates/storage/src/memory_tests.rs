#![allow(clippy::unwrap_used, reason = "test code")]

use serde_json::json;
use uuid::Uuid;
use voiceplan_core::{
    AuditEntry, AuditOperation, AuditStatus, CommitCounts, CommitMode, CommitStatus, PlanDocument,
    VoiceSession,
};

use crate::traits::{AuditStore, HealthStore, PlanStore, SessionStore, UserStore};
use crate::{MemoryStorage, PlanRows, StorageBackend, StorageError};

fn sample_plan() -> PlanDocument {
    PlanDocument::from_value(&json!({
        "title": "Launch",
        "milestones": [{"id": "m1", "name": "Alpha"}, {"id": "m2", "name": "Beta"}],
        "tasks": [
            {"id": "t1", "title": "Design", "priority": "high", "milestone_id": "m1"},
            {"id": "t2", "title": "Build", "priority": "high", "dependencies": ["t1"], "milestone_id": "m2"},
            {"id": "t3", "title": "Ship", "priority": "medium", "dependencies": ["t2"]}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn sessions_round_trip_and_list_newest_first() {
    let storage = MemoryStorage::new();
    let org = Uuid::new_v4();
    let mut first = VoiceSession::new(org, Uuid::new_v4(), "en");
    first.created_at -= chrono::Duration::minutes(5);
    let second = VoiceSession::new(org, Uuid::new_v4(), "de");
    let other_org = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    for s in [&first, &second, &other_org] {
        storage.save_session(s).await.unwrap();
    }

    let listed = storage.list_sessions(org, 10).await.unwrap();
    assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    assert_eq!(storage.list_sessions(org, 1).await.unwrap().len(), 1);
    assert_eq!(storage.get_session(other_org.id).await.unwrap().unwrap(), other_org);
    assert!(storage.get_session(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn commit_writes_every_row_and_rollback_removes_them() {
    let storage = MemoryStorage::new();
    let session = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    let rows = PlanRows::build(&session, &sample_plan(), Some(0.9));

    let committed = storage.commit_plan(rows).await.unwrap();
    let expected = CommitCounts { projects: 1, milestones: 2, tasks: 3, dependencies: 2 };
    assert_eq!(committed.counts, expected);
    assert_eq!(storage.count_plan_rows(session.id).await.unwrap(), expected);

    let deleted = storage.rollback_plan(session.id).await.unwrap();
    assert_eq!(deleted, expected);
    assert_eq!(storage.count_plan_rows(session.id).await.unwrap(), CommitCounts::default());
}

#[tokio::test]
async fn failed_commit_publishes_nothing() {
    let storage = MemoryStorage::new();
    storage.set_commit_failure(true);
    let session = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    let err = storage
        .commit_plan(PlanRows::build(&session, &sample_plan(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert_eq!(storage.count_plan_rows(session.id).await.unwrap().total(), 0);
}

#[tokio::test]
async fn rollback_only_touches_its_session() {
    let storage = MemoryStorage::new();
    let a = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    let b = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    storage.commit_plan(PlanRows::build(&a, &sample_plan(), None)).await.unwrap();
    storage.commit_plan(PlanRows::build(&b, &sample_plan(), None)).await.unwrap();

    storage.rollback_plan(a.id).await.unwrap();
    assert_eq!(storage.count_plan_rows(b.id).await.unwrap().tasks, 3);
}

#[tokio::test]
async fn audit_entries_open_and_close() {
    let storage = MemoryStorage::new();
    let session_id = Uuid::new_v4();
    let mut entry = AuditEntry::open(
        session_id,
        Uuid::new_v4(),
        Uuid::new_v4(),
        AuditOperation::Commit,
        CommitMode::Production,
    );
    storage.open_audit(&entry).await.unwrap();
    assert!(storage.open_audit(&entry).await.unwrap_err().is_duplicate());

    entry.complete(json!({"tasks": 3}));
    storage.close_audit(&entry).await.unwrap();

    let listed = storage.list_audit(session_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, AuditStatus::Completed);
    assert_eq!(listed[0].result, Some(json!({"tasks": 3})));
}

#[tokio::test]
async fn closing_unknown_audit_is_not_found() {
    let storage = MemoryStorage::new();
    let entry = AuditEntry::open(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        AuditOperation::Rollback,
        CommitMode::Production,
    );
    assert!(matches!(
        storage.close_audit(&entry).await.unwrap_err(),
        StorageError::NotFound { .. }
    ));
}

#[tokio::test]
async fn upsert_user_is_keyed_by_normalized_email() {
    let storage = MemoryStorage::new();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    let created = storage.upsert_user("Ana@Example.com ", org_a, "member").await.unwrap();
    let updated = storage.upsert_user("ana@example.com", org_b, "admin").await.unwrap();
    assert_eq!(created.id, updated.id);
    assert_eq!(updated.organization_id, org_b);
    assert_eq!(updated.role, "admin");
    assert_eq!(updated.email, "ana@example.com");
    assert!(storage.get_user_by_email("ANA@example.com").await.unwrap().is_some());
}

#[tokio::test]
async fn lists_shadow_sessions_oldest_first() {
    let storage = StorageBackend::new_memory();
    let mut older = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    older.created_at -= chrono::Duration::hours(1);
    older.commit_status = Some(CommitStatus::Shadow);
    let mut newer = VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en");
    newer.commit_status = Some(CommitStatus::Shadow);
    let committed = VoiceSession {
        commit_status: Some(CommitStatus::Committed),
        ..VoiceSession::new(Uuid::new_v4(), Uuid::new_v4(), "en")
    };
    for s in [&newer, &older, &committed] {
        storage.save_session(s).await.unwrap();
    }

    let shadow = storage.list_sessions_by_commit_status(CommitStatus::Shadow, 10).await.unwrap();
    assert_eq!(shadow.iter().map(|s| s.id).collect::<Vec<_>>(), vec![older.id, newer.id]);
    storage.ping().await.unwrap();
    assert_eq!(storage.backend_name(), "memory");
}
