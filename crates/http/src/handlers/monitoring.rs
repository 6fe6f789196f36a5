use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;
use voiceplan_service::monitoring::{KpiDashboard, KpiStatus, PerformanceAlert};

use crate::AppState;
use crate::api_error::ApiError;
use crate::identity::Identity;
use crate::query_types::DashboardQuery;

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Identity(_actor): Identity,
    Query(query): Query<DashboardQuery>,
) -> Json<KpiDashboard> {
    Json(state.monitoring.dashboard(query.capped_window()))
}

pub async fn status(State(state): State<Arc<AppState>>, Identity(_actor): Identity) -> Json<KpiStatus> {
    Json(state.monitoring.kpi_status())
}

pub async fn alerts(
    State(state): State<Arc<AppState>>,
    Identity(_actor): Identity,
) -> Json<Vec<PerformanceAlert>> {
    Json(state.monitoring.active_alerts())
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    let alert = state.monitoring.resolve_alert(id)?;
    tracing::info!(alert_id = %id, user_id = %actor.user_id, "alert resolved");
    Ok(Json(alert))
}
