// Externally visible projections served to the read-query surface.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::MinMax;

/// Formatted view of one statistics snapshot. Measures without samples carry
/// synthesized values, never zero or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsView {
    pub timestamp: DateTime<Local>,
    pub average_handle_time: f64,
    pub min_max_handle_time: MinMax,
    pub average_process_time: f64,
    pub min_max_process_time: MinMax,
    pub error_percentage: f64,
}

/// Ring contents as returned by `getLatest` / `getHourly`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub range: [DateTime<Local>; 2],
    pub count: usize,
    pub entries: Vec<StatisticsView>,
}

impl StatisticsResponse {
    /// Explicit empty form: `{ range: [now, now], count: 0, entries: [] }`.
    pub fn empty(now: DateTime<Local>) -> Self {
        Self {
            range: [now, now],
            count: 0,
            entries: Vec::new(),
        }
    }

    /// Builds the response over ring entries; fewer than two entries yields the empty form.
    pub fn from_entries(entries: Vec<StatisticsView>, now: DateTime<Local>) -> Self {
        if entries.len() < 2 {
            return Self::empty(now);
        }
        Self {
            range: [entries[0].timestamp, entries[entries.len() - 1].timestamp],
            count: entries.len(),
            entries,
        }
    }
}
