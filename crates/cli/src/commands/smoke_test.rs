use std::process::ExitCode;

use anyhow::Result;
use voiceplan_service::ops::smoke_test;
use voiceplan_storage::StorageBackend;

use crate::get_database_url;

pub(crate) async fn run() -> Result<ExitCode> {
    let storage = StorageBackend::from_database_url(get_database_url().as_deref()).await?;
    let report = smoke_test(&storage).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(backend = report.backend, "smoke test failed");
        Ok(ExitCode::FAILURE)
    }
}
