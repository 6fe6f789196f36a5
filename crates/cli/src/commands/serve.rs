use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use voiceplan_core::FeatureFlags;
use voiceplan_core::env_config::{env_list, env_non_empty};
use voiceplan_http::{AppState, Providers, cors_layer, create_router};
use voiceplan_llm::{LlmClient, SpeechClient, TranscriptionClient};
use voiceplan_service::{MonitoringConfig, OrchestratorConfig};
use voiceplan_storage::StorageBackend;
use voiceplan_storage::traits::HealthStore;

use crate::{get_api_key, get_base_url, get_database_url};

pub(crate) async fn run(port: u16, host: String) -> Result<ExitCode> {
    let storage = Arc::new(StorageBackend::from_database_url(get_database_url().as_deref()).await?);

    let api_key = get_api_key()?;
    let base_url = get_base_url();
    let stt_url = env_non_empty("VOICEPLAN_STT_URL").unwrap_or_else(|| base_url.clone());

    let planner = LlmClient::new(api_key.clone(), base_url.clone())?;
    tracing::info!(model = planner.model(), url = planner.base_url(), "plan generator configured");
    let transcriber = TranscriptionClient::new(api_key.clone(), stt_url)?;
    tracing::info!(model = transcriber.model(), "transcriber configured");
    let synthesizer = SpeechClient::new(api_key, base_url)?;

    let flags = FeatureFlags::from_env();
    tracing::info!(flags = ?flags.enabled_flags(), "feature flags loaded");

    let providers = Providers {
        planner: Arc::new(planner),
        transcriber: Some(Arc::new(transcriber)),
        synthesizer: Some(Arc::new(synthesizer)),
    };
    let state = Arc::new(AppState::new(
        storage.clone(),
        Arc::new(flags),
        providers,
        OrchestratorConfig::from_env(),
        MonitoringConfig::from_env(),
    ));

    let router = create_router(state, cors_layer(&env_list("VOICEPLAN_CORS_ORIGINS")));
    let addr = format!("{host}:{port}");
    tracing::info!(backend = storage.backend_name(), "Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(ExitCode::SUCCESS)
}
