// History rebuilt from persisted daily files, plus the read-views derived from it.
// Rebuilt wholesale on every `generate`; no incremental updates.

mod files;

pub use files::{daily_log_path, date_from_file_name, overview_log_path, parse_log_date};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument, warn};

use crate::models::{HistoryEntry, LogData, LogSection, LogTimings};

/// Weekday buckets, ordered Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn of(date: NaiveDate) -> Self {
        Self::ALL[date.weekday().num_days_from_sunday() as usize]
    }
}

/// Requests recorded on one calendar day (raw count or share of the grand total).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRequests {
    pub date: NaiveDate,
    pub total_requests: f64,
}

/// Timings plus error share; the privacy-preserving form of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedData {
    #[serde(flatten)]
    pub timings: LogTimings,
    pub error_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntry {
    pub date: NaiveDate,
    pub data: NormalizedData,
}

/// `statisticsPerDay` result: raw entries, or normalized ones without counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DailyStatistics {
    Raw(Vec<HistoryEntry>),
    Normalized(Vec<NormalizedEntry>),
}

/// All-time means over every history entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAverages {
    pub total_requests: f64,
    pub total_errors: f64,
    pub error_percentage: f64,
    pub average_total_time: f64,
    pub average_handle_time: f64,
    pub average_process_time: f64,
}

/// Only the `overview` section matters for history; `hourly` is ignored.
#[derive(Deserialize)]
struct OverviewSection {
    #[serde(default)]
    overview: LogSection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogHistory {
    entries: Vec<HistoryEntry>,
}

impl LogHistory {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    /// Scans `dir` for daily files and rebuilds the history from their
    /// `overview` sections. Unreadable or malformed files are skipped one by
    /// one. The same `(date, range)` appearing in both a day file and its
    /// `-overview` sibling is counted once.
    #[instrument(fields(operation = "generate_history"))]
    pub fn generate(dir: &Path) -> Self {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "logs directory unreadable; history is empty");
                return Self::default();
            }
        };

        let mut unique: BTreeMap<(NaiveDate, String), LogData> = BTreeMap::new();
        let mut files_read = 0usize;

        for dir_entry in read_dir.flatten() {
            let name = dir_entry.file_name();
            let Some(date) = name.to_str().and_then(date_from_file_name) else {
                continue;
            };
            let path = dir_entry.path();
            let section = match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<OverviewSection>(&s).map_err(Into::into))
            {
                Ok(section) => section.overview,
                Err(e) => {
                    warn!(error = %e, file = %path.display(), "skipping malformed log file");
                    continue;
                }
            };
            files_read += 1;
            for (range, data) in section {
                unique.insert((date, range), data.unwrap_or_default());
            }
        }

        let entries: Vec<HistoryEntry> = unique
            .into_iter()
            .map(|((date, _), data)| HistoryEntry { date, data })
            .collect();
        debug!(files_read, entries = entries.len(), "history generated");
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries bucketed by weekday; all seven buckets are always present.
    pub fn map_by_weekday(&self) -> BTreeMap<Weekday, Vec<&LogData>> {
        let mut map: BTreeMap<Weekday, Vec<&LogData>> =
            Weekday::ALL.iter().map(|d| (*d, Vec::new())).collect();
        for entry in &self.entries {
            map.entry(Weekday::of(entry.date))
                .or_default()
                .push(&entry.data);
        }
        map
    }

    /// Mean `totalRequests` per weekday; `normalize` rescales the seven values
    /// to sum to 1.
    pub fn requests_per_weekday(&self, normalize: bool) -> BTreeMap<Weekday, f64> {
        let means: BTreeMap<Weekday, f64> = self
            .map_by_weekday()
            .into_iter()
            .map(|(day, list)| {
                let mean = if list.is_empty() {
                    0.0
                } else {
                    list.iter()
                        .map(|d| d.overview.total_requests as f64)
                        .sum::<f64>()
                        / list.len() as f64
                };
                (day, mean)
            })
            .collect();

        if normalize {
            normalize_values(means)
        } else {
            means
        }
    }

    /// Requests summed per calendar date, in date order; `normalize` turns them
    /// into shares of the grand total.
    pub fn requests_per_day(&self, normalize: bool) -> Vec<DayRequests> {
        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for entry in &self.entries {
            *per_day.entry(entry.date).or_insert(0.0) += entry.data.overview.total_requests as f64;
        }
        if normalize {
            per_day = normalize_values(per_day);
        }
        per_day
            .into_iter()
            .map(|(date, total_requests)| DayRequests {
                date,
                total_requests,
            })
            .collect()
    }

    /// Raw entries, or timings plus error share when `normalize` is set.
    pub fn statistics_per_day(&self, normalize: bool) -> DailyStatistics {
        if !normalize {
            return DailyStatistics::Raw(self.entries.clone());
        }
        DailyStatistics::Normalized(
            self.entries
                .iter()
                .map(|entry| NormalizedEntry {
                    date: entry.date,
                    data: NormalizedData {
                        timings: entry.data.timings.clone(),
                        error_percentage: entry.data.overview.error_percentage,
                    },
                })
                .collect(),
        )
    }

    /// All-time means of the overview and timing fields; `None` without history.
    pub fn average_timings(&self) -> Option<LogAverages> {
        if self.entries.is_empty() {
            return None;
        }
        let n = self.entries.len() as f64;
        let mut sum = LogAverages {
            total_requests: 0.0,
            total_errors: 0.0,
            error_percentage: 0.0,
            average_total_time: 0.0,
            average_handle_time: 0.0,
            average_process_time: 0.0,
        };
        for HistoryEntry { data, .. } in &self.entries {
            sum.total_requests += data.overview.total_requests as f64;
            sum.total_errors += data.overview.total_errors as f64;
            sum.error_percentage += data.overview.error_percentage;
            sum.average_total_time += data.timings.average_total_time;
            sum.average_handle_time += data.timings.average_handle_time;
            sum.average_process_time += data.timings.average_process_time;
        }
        Some(LogAverages {
            total_requests: sum.total_requests / n,
            total_errors: sum.total_errors / n,
            error_percentage: sum.error_percentage / n,
            average_total_time: sum.average_total_time / n,
            average_handle_time: sum.average_handle_time / n,
            average_process_time: sum.average_process_time / n,
        })
    }
}

/// Rescales values into shares of their sum at 2-decimal precision. Hundredths
/// are apportioned by largest remainder so the shares always add up to exactly 1;
/// all zeros stay zero.
fn normalize_values<K: Ord>(values: BTreeMap<K, f64>) -> BTreeMap<K, f64> {
    let total: f64 = values.values().sum();
    if total <= 0.0 {
        return values.into_keys().map(|k| (k, 0.0)).collect();
    }

    let exact: Vec<(K, f64)> = values
        .into_iter()
        .map(|(k, v)| (k, v / total * 100.0))
        .collect();
    let mut cents: Vec<u64> = exact.iter().map(|(_, e)| e.floor() as u64).collect();
    let assigned: u64 = cents.iter().sum();

    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a].1 - exact[a].1.floor();
        let rb = exact[b].1 - exact[b].1.floor();
        rb.total_cmp(&ra)
    });
    for &i in by_remainder.iter().take(100u64.saturating_sub(assigned) as usize) {
        cents[i] += 1;
    }

    exact
        .into_iter()
        .zip(cents)
        .map(|((k, _), c)| (k, c as f64 / 100.0))
        .collect()
}
