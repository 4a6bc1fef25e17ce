//! Read-only HTTP projection of the persisted state, plus the two
//! administrative scheduler endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use holdscore_engine::PointsScheduler;
use holdscore_storage::{BalanceStore, PgStore, PointsStore};

/// Shared application state.
pub struct AppState {
    pub store: Arc<PgStore>,
    pub scheduler: PointsScheduler,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/balance/:chain/:address", get(get_balance))
        .route(
            "/api/v1/balance/:chain/:address/changes",
            get(get_balance_changes),
        )
        .route("/api/v1/points/:chain/:address", get(get_points))
        .route(
            "/api/v1/points/:chain/:address/history",
            get(get_points_history),
        )
        .route("/api/v1/leaderboard/:chain", get(get_leaderboard))
        .route("/api/v1/admin/calculate/:chain", post(trigger_calculation))
        .route("/api/v1/admin/backfill/:chain", post(start_backfill))
        .with_state(state)
}

// ─── Response Envelope ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn reply<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
        .into_response()
}

fn ok<T: Serialize>(data: T) -> Response {
    reply(StatusCode::OK, data)
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
        .into_response()
}

fn internal(e: impl std::fmt::Display) -> Response {
    fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ─── Query Params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TimeRangeParams {
    start_time: Option<String>,
    end_time: Option<String>,
}

impl TimeRangeParams {
    /// Resolve the window, defaulting to the last `default_window` before now.
    /// Malformed timestamps are a 400.
    fn resolve(
        &self,
        default_window: Duration,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), Response> {
        let end = match &self.end_time {
            Some(raw) => parse_rfc3339(raw)?,
            None => Utc::now(),
        };
        let start = match &self.start_time {
            Some(raw) => parse_rfc3339(raw)?,
            None => end - default_window,
        };
        Ok((start, end))
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, Response> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            fail(
                StatusCode::BAD_REQUEST,
                format!("invalid timestamp {raw:?}, use RFC3339"),
            )
        })
}

#[derive(Debug, Deserialize)]
struct LeaderboardParams {
    limit: Option<i64>,
}

fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// GET /health — liveness plus the scheduler's running flag.
async fn health(State(state): State<Arc<AppState>>) -> Response {
    ok(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "scheduler": state.scheduler.is_running(),
    }))
}

/// GET /api/v1/balance/:chain/:address — current balance.
async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path((chain, address)): Path<(String, String)>,
) -> Response {
    let address = normalize_address(&address);
    match state.store.get_balance(&chain, &address).await {
        Ok(Some(balance)) => ok(balance),
        Ok(None) => fail(StatusCode::NOT_FOUND, "balance not found"),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/balance/:chain/:address/changes — change log window
/// (defaults to the last 24 hours).
async fn get_balance_changes(
    State(state): State<Arc<AppState>>,
    Path((chain, address)): Path<(String, String)>,
    Query(params): Query<TimeRangeParams>,
) -> Response {
    let address = normalize_address(&address);
    let (start, end) = match params.resolve(Duration::hours(24)) {
        Ok(window) => window,
        Err(response) => return response,
    };

    match state.store.get_changes(&chain, &address, start, end).await {
        Ok(changes) => ok(changes),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/points/:chain/:address — current points.
async fn get_points(
    State(state): State<Arc<AppState>>,
    Path((chain, address)): Path<(String, String)>,
) -> Response {
    let address = normalize_address(&address);
    match state.store.get_points(&chain, &address).await {
        Ok(Some(points)) => ok(points),
        Ok(None) => fail(StatusCode::NOT_FOUND, "points not found"),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/points/:chain/:address/history — points history window
/// (defaults to the last 7 days).
async fn get_points_history(
    State(state): State<Arc<AppState>>,
    Path((chain, address)): Path<(String, String)>,
    Query(params): Query<TimeRangeParams>,
) -> Response {
    let address = normalize_address(&address);
    let (start, end) = match params.resolve(Duration::days(7)) {
        Ok(window) => window,
        Err(response) => return response,
    };

    match state.store.get_history(&chain, &address, start, end).await {
        Ok(history) => ok(history),
        Err(e) => internal(e),
    }
}

/// GET /api/v1/leaderboard/:chain — top holders by total points.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(chain): Path<String>,
    Query(params): Query<LeaderboardParams>,
) -> Response {
    let limit = match params.limit {
        Some(l) if (1..=1000).contains(&l) => l,
        _ => 100,
    };

    match state.store.list_points(&chain, 0, limit).await {
        Ok(top) => ok(top),
        Err(e) => internal(e),
    }
}

/// POST /api/v1/admin/calculate/:chain — synchronously run the last complete
/// hour for one chain.
async fn trigger_calculation(
    State(state): State<Arc<AppState>>,
    Path(chain): Path<String>,
) -> Response {
    match state.scheduler.trigger(&chain).await {
        Ok(outcome) => ok(json!({
            "chain": chain,
            "succeeded": outcome.succeeded,
            "failed": outcome.failed,
        })),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
struct BackfillRequest {
    start_time: String,
    end_time: String,
}

/// POST /api/v1/admin/backfill/:chain — asynchronously backfill a window;
/// answers 202 once the job is spawned.
async fn start_backfill(
    State(state): State<Arc<AppState>>,
    Path(chain): Path<String>,
    body: Result<Json<BackfillRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return fail(
                StatusCode::BAD_REQUEST,
                format!("invalid request: {rejection}"),
            )
        }
    };

    let start = match parse_rfc3339(&request.start_time) {
        Ok(t) => t,
        Err(response) => return response,
    };
    let end = match parse_rfc3339(&request.end_time) {
        Ok(t) => t,
        Err(response) => return response,
    };
    if start >= end {
        return fail(StatusCode::BAD_REQUEST, "start_time must be before end_time");
    }

    let scheduler = state.scheduler.clone();
    let job_chain = chain.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.backfill(&job_chain, start, end).await {
            tracing::error!(chain = %job_chain, error = %e, "backfill failed");
        }
    });

    reply(
        StatusCode::ACCEPTED,
        json!({ "message": "backfill started", "chain": chain }),
    )
}
