// GET handlers. Every statistics route answers 500 while the worker is down.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::QueryError;

const API_KEY_HEADER: &str = "x-api-key";
const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "err": self.to_string(),
            "status": self.status(),
        }));
        (status, body).into_response()
    }
}

fn ensure_running(state: &AppState) -> Result<(), QueryError> {
    if state.supervisor.is_active() {
        Ok(())
    } else {
        Err(QueryError::ServiceUnavailable)
    }
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    state.api.is_authorized(key)
}

/// GET /version: host name and version plus the supervised worker manifest.
pub(super) async fn version_handler(State(state): State<AppState>) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    let worker = state.supervisor.status().worker;
    Ok(Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
        "worker": worker.map(|w| serde_json::json!({ "name": w.name, "version": w.version })),
    }))
    .into_response())
}

pub(super) async fn latest_handler(State(state): State<AppState>) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    Ok(Json(state.query.get_latest()).into_response())
}

pub(super) async fn hourly_handler(State(state): State<AppState>) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    Ok(Json(state.query.get_hourly()).into_response())
}

pub(super) async fn history_handler(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    Ok(Json(state.query.get_history(&date)?).into_response())
}

pub(super) async fn statistics_per_day_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    let auth = authorized(&state, &headers);
    Ok(Json(state.query.get_statistics_per_day(auth)).into_response())
}

pub(super) async fn requests_per_day_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    let auth = authorized(&state, &headers);
    Ok(Json(state.query.get_requests_per_day(auth)).into_response())
}

pub(super) async fn requests_per_weekday_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, QueryError> {
    ensure_running(&state)?;
    let auth = authorized(&state, &headers);
    Ok(Json(state.query.get_requests_per_weekday(auth)).into_response())
}
