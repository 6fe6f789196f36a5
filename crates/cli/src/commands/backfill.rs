use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use voiceplan_core::FeatureFlags;
use voiceplan_service::{CommitService, EventEmitter, TracingSink};
use voiceplan_storage::StorageBackend;

use crate::require_database_url;

pub(crate) async fn run(limit: usize) -> Result<ExitCode> {
    let storage = Arc::new(StorageBackend::new_postgres(&require_database_url()?).await?);
    // Backfill ignores flags; events still go to the log sink.
    let events = Arc::new(EventEmitter::new(vec![Arc::new(TracingSink)]));
    let commits = CommitService::new(storage, Arc::new(FeatureFlags::disabled()), events);
    let report = commits.backfill_shadow_sessions(limit).await?;
    tracing::info!(
        examined = report.examined,
        committed = report.committed,
        failed = report.failed.len(),
        "backfill finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.failed.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
