use std::process::ExitCode;

use anyhow::Result;
use uuid::Uuid;
use voiceplan_service::ops::provision_user;
use voiceplan_storage::StorageBackend;

use crate::require_database_url;

pub(crate) async fn run(email: &str, organization_id: Uuid, role: &str) -> Result<ExitCode> {
    let storage = StorageBackend::new_postgres(&require_database_url()?).await?;
    let user = provision_user(&storage, email, organization_id, role).await?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(ExitCode::SUCCESS)
}
