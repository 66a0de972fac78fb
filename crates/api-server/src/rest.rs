//! REST API handlers for the sequence engine.
//!
//! Tracking endpoints stay quiet on unknown ids (a 404 body, never a 5xx)
//! because pixels and redirect links are routinely replayed and forged.
//! The due-steps listing exposes cross-lead content and requires the
//! administrative role header.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

use cadence_core::error::CadenceError;
use cadence_core::types::{DeliveryOutcome, ScheduledStep, SequenceStartResult, StatusSummary};
use cadence_engine::{DispatchQueue, EngagementTracker, SequenceScheduler, StatusAggregator};

/// Bounds for the due-steps `limit` parameter.
const MIN_DUE_LIMIT: usize = 1;
const MAX_DUE_LIMIT: usize = 1000;
const DEFAULT_DUE_LIMIT: usize = 100;

/// Header carrying the caller's role; the due-steps listing requires
/// `admin`.
const ROLE_HEADER: &str = "x-api-role";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SequenceScheduler>,
    pub tracker: Arc<EngagementTracker>,
    pub dispatch: DispatchQueue,
    pub status: StatusAggregator,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSequenceRequest {
    pub template_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Deserialize)]
pub struct DueQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct TrackResponse {
    pub tracked: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// Validate the due-steps limit at the API boundary.
fn validate_limit(limit: Option<usize>) -> Result<usize, &'static str> {
    match limit {
        None => Ok(DEFAULT_DUE_LIMIT),
        Some(n) if (MIN_DUE_LIMIT..=MAX_DUE_LIMIT).contains(&n) => Ok(n),
        Some(_) => Err("'limit' must be between 1 and 1000"),
    }
}

/// The due-steps listing exposes cross-lead content; only admins may call it.
fn is_admin(headers: &HeaderMap) -> bool {
    headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|role| role.eq_ignore_ascii_case("admin"))
        .unwrap_or(false)
}

fn map_engine_error(err: CadenceError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        CadenceError::NotFound(what) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_found".to_string(),
                message: what,
            }),
        ),
        CadenceError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                message: msg,
            }),
        ),
        other => {
            error!(error = %other, "Engine operation failed");
            metrics::counter!("api.errors").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            )
        }
    }
}

/// POST /v1/tenants/{tenant_id}/leads/{lead_id}/sequence
///
/// Soft outcomes (already active, no contact address) come back as 200 with
/// `success = false` so bulk import pipelines don't treat them as failures.
pub async fn start_sequence(
    State(state): State<AppState>,
    Path((tenant_id, lead_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<StartSequenceRequest>>,
) -> Result<Json<SequenceStartResult>, (StatusCode, Json<ErrorResponse>)> {
    let template_id = body.and_then(|Json(req)| req.template_id);
    match state.scheduler.start_sequence(tenant_id, lead_id, template_id) {
        Ok(result) => Ok(Json(result)),
        Err(err) => Err(map_engine_error(err)),
    }
}

/// GET /v1/tenants/{tenant_id}/leads/{lead_id}/sequence
pub async fn sequence_status(
    State(state): State<AppState>,
    Path((tenant_id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<StatusSummary>, (StatusCode, Json<ErrorResponse>)> {
    match state.status.sequence_status(tenant_id, lead_id) {
        Ok(summary) => Ok(Json(summary)),
        Err(err) => Err(map_engine_error(err)),
    }
}

/// POST /v1/track/{step_id}/open
pub async fn track_open(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
) -> (StatusCode, Json<TrackResponse>) {
    track_result(state.tracker.record_open(step_id))
}

/// POST /v1/track/{step_id}/click
pub async fn track_click(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
) -> (StatusCode, Json<TrackResponse>) {
    track_result(state.tracker.record_click(step_id))
}

fn track_result(tracked: bool) -> (StatusCode, Json<TrackResponse>) {
    let code = if tracked {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (code, Json(TrackResponse { tracked }))
}

/// POST /v1/steps/{step_id}/delivery — delivery worker write-back.
pub async fn record_delivery(
    State(state): State<AppState>,
    Path(step_id): Path<Uuid>,
    Json(report): Json<DeliveryReport>,
) -> (StatusCode, Json<TrackResponse>) {
    track_result(state.tracker.record_delivery(step_id, report.outcome))
}

/// GET /v1/tenants/{tenant_id}/due-steps?limit=N — admin only.
pub async fn due_steps(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<DueQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScheduledStep>>, (StatusCode, Json<ErrorResponse>)> {
    if !is_admin(&headers) {
        warn!(tenant_id = %tenant_id, "Due-steps listing denied, missing admin role");
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "forbidden".to_string(),
                message: "Administrative role required".to_string(),
            }),
        ));
    }

    let limit = validate_limit(query.limit).map_err(|msg| {
        metrics::counter!("api.validation_errors").increment(1);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                message: msg.to_string(),
            }),
        )
    })?;

    Ok(Json(state.dispatch.due_steps(tenant_id, limit)))
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
