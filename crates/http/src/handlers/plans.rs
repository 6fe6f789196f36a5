use axum::Json;
use voiceplan_core::{ValidationContext, ValidationOptions, ValidationReport, validate_plan};

use crate::identity::Identity;
use crate::query_types::ValidatePlanRequest;

/// Reconcile a plan without touching any session. Problems come back as data.
pub async fn validate(
    Identity(actor): Identity,
    Json(req): Json<ValidatePlanRequest>,
) -> Json<ValidationReport> {
    let defaults = ValidationOptions::default();
    let options = ValidationOptions {
        strict: req.strict,
        dry_run: req.dry_run,
        max_hours_per_assignee: req.max_hours_per_assignee.unwrap_or(defaults.max_hours_per_assignee),
    };
    let context = ValidationContext {
        organization_id: Some(actor.organization_id),
        user_id: Some(actor.user_id),
    };
    Json(validate_plan(&req.plan, &context, &options))
}
