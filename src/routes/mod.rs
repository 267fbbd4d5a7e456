// HTTP query surface over the aggregator's published state

mod http;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::aggregator::AnalyticsQuery;
use crate::config::ApiConfig;
use crate::supervisor::SupervisorHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) query: AnalyticsQuery,
    pub(crate) supervisor: SupervisorHandle,
    pub(crate) api: ApiConfig,
}

pub fn app(query: AnalyticsQuery, supervisor: SupervisorHandle, api: ApiConfig) -> Router {
    let state = AppState {
        query,
        supervisor,
        api,
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/statistics/latest", get(http::latest_handler)) // GET /statistics/latest
        .route("/statistics/hourly", get(http::hourly_handler)) // GET /statistics/hourly
        .route("/statistics/history", get(http::statistics_per_day_handler)) // GET /statistics/history
        .route("/statistics/history/{date}", get(http::history_handler)) // GET /statistics/history/DD-MM-YYYY
        .route("/statistics/requests", get(http::requests_per_day_handler)) // GET /statistics/requests
        .route(
            "/statistics/requests/weekday",
            get(http::requests_per_weekday_handler),
        ) // GET /statistics/requests/weekday
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
