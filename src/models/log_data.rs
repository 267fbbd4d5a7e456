// Persisted daily records: one LogData per timestamp range, grouped by label.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[min, max]` pair; either side is `null` when the measure had no samples.
pub type MinMax = [Option<f64>; 2];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOverview {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTimings {
    pub average_total_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_max_total_time: Option<MinMax>,
    pub average_handle_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_max_handle_time: Option<MinMax>,
    pub average_process_time: f64,
    #[serde(
        default,
        alias = "minMaxprocessTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_max_process_time: Option<MinMax>,
}

/// One persisted summary of a rollup window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogData {
    pub overview: LogOverview,
    pub timings: LogTimings,
    /// Error code (as string key) → count.
    #[serde(default)]
    pub error_map: BTreeMap<String, u64>,
}

/// One timestamped section of a persisted daily file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub data: LogData,
}

/// Section of a daily file: `"<start> - <end>"` → record, or `null` when the
/// window saw no traffic.
pub type LogSection = BTreeMap<String, Option<LogData>>;

/// Whole persisted daily document (`logs/DD-MM-YYYY.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hourly: LogSection,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overview: LogSection,
}
