use std::process::ExitCode;

use anyhow::Result;
use voiceplan_storage::StorageBackend;

use crate::require_database_url;

/// Connecting runs pending migrations; they are idempotent.
pub(crate) async fn run() -> Result<ExitCode> {
    let url = require_database_url()?;
    StorageBackend::new_postgres(&url).await?;
    tracing::info!("migrations applied");
    Ok(ExitCode::SUCCESS)
}
