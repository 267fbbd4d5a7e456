// Read-query surface consumed by the HTTP layer. Every query reads state the
// aggregator already published; nothing here mutates the pipeline.

use chrono::Local;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::QueryError;
use crate::log_history::{
    DailyStatistics, DayRequests, LogHistory, Weekday, daily_log_path, overview_log_path,
    parse_log_date,
};
use crate::models::{DailyLog, StatisticsResponse, StatisticsView};
use crate::statistics::read_daily_log;

/// Snapshot of the rings and history as of the last tick.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsState {
    pub latest: Vec<StatisticsView>,
    pub hourly: Vec<StatisticsView>,
    pub history: Arc<LogHistory>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    state_rx: watch::Receiver<Arc<AnalyticsState>>,
    logs_dir: PathBuf,
}

impl AnalyticsQuery {
    pub(super) fn new(state_rx: watch::Receiver<Arc<AnalyticsState>>, logs_dir: PathBuf) -> Self {
        Self { state_rx, logs_dir }
    }

    fn state(&self) -> Arc<AnalyticsState> {
        self.state_rx.borrow().clone()
    }

    /// Tick snapshots of roughly the last hour.
    pub fn get_latest(&self) -> StatisticsResponse {
        StatisticsResponse::from_entries(self.state().latest.clone(), Local::now())
    }

    /// Hourly snapshots of roughly the last day.
    pub fn get_hourly(&self) -> StatisticsResponse {
        StatisticsResponse::from_entries(self.state().hourly.clone(), Local::now())
    }

    /// Persisted document for `date` (`DD-MM-YYYY`). Today's file is still being
    /// written and is never served.
    pub fn get_history(&self, date: &str) -> Result<DailyLog, QueryError> {
        let parsed = parse_log_date(date).ok_or_else(|| QueryError::InvalidDate(date.into()))?;
        if parsed == Local::now().date_naive() {
            return Err(QueryError::NotYetAvailable(date.into()));
        }

        let path = [
            daily_log_path(&self.logs_dir, parsed),
            overview_log_path(&self.logs_dir, parsed),
        ]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| QueryError::NotFound(date.into()))?;

        read_daily_log(&path).map_err(|e| {
            tracing::warn!(error = %e, file = %path.display(), "history file unreadable");
            QueryError::Corrupted(date.into())
        })
    }

    /// Unauthorized callers get shares of the total instead of raw counts.
    pub fn get_requests_per_day(&self, authorized: bool) -> Vec<DayRequests> {
        self.state().history.requests_per_day(!authorized)
    }

    pub fn get_requests_per_weekday(&self, authorized: bool) -> BTreeMap<Weekday, f64> {
        self.state().history.requests_per_weekday(!authorized)
    }

    pub fn get_statistics_per_day(&self, authorized: bool) -> DailyStatistics {
        self.state().history.statistics_per_day(!authorized)
    }
}
