// Statistics reducer: raw packets → snapshot, child snapshots → parent snapshot.
// Pure reduction; persistence lives in `export`.

mod export;
mod noise;

pub use export::{LogLabel, RANGE_FORMAT, read_daily_log, write_daily_log};
pub use noise::{Baseline, FixedNoise, NOISE_RATIO, NoiseSource, StdNoise, jitter, round2};

use chrono::{DateTime, Local};
use std::collections::BTreeMap;

use crate::models::{LogData, LogOverview, LogTimings, MinMax, Packet, StatisticsView};

/// Spread of synthesized min/max around a synthesized average (ms).
const SYNTHETIC_SPREAD: f64 = 10.0;

/// Average and bounds of one timing measure. All `None` until it has samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measure {
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Measure {
    fn bound(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn merge_bounds(&mut self, other: &Measure) {
        if let Some(min) = other.min {
            self.bound(min);
        }
        if let Some(max) = other.max {
            self.bound(max);
        }
    }

    pub fn min_max(&self) -> MinMax {
        [self.min, self.max]
    }
}

/// Aggregation unit over `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub total_requests: u64,
    pub total_errors: u64,
    pub multipart_count: u64,
    pub error_map: BTreeMap<i64, u64>,
    pub total_time: Measure,
    /// Only meaningful when `multipart_count > 0`.
    pub handle_time: Measure,
    /// Only meaningful when `multipart_count > 0`.
    pub process_time: Measure,
}

impl Statistics {
    /// Zeroed snapshot over `[start, end]`.
    pub fn empty(start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self {
            start,
            end,
            total_requests: 0,
            total_errors: 0,
            multipart_count: 0,
            error_map: BTreeMap::new(),
            total_time: Measure::default(),
            handle_time: Measure::default(),
            process_time: Measure::default(),
        }
    }

    /// Reduces one tick's raw packets. The window runs from `start` to `now`.
    pub fn from_packets(batch: &[Packet], start: DateTime<Local>, now: DateTime<Local>) -> Self {
        let mut stats = Self::empty(start, now);
        if batch.is_empty() {
            return stats;
        }

        let mut total_sum = 0.0;
        let mut handle_sum = 0.0;
        let mut process_sum = 0.0;

        for packet in batch {
            stats.total_requests += 1;
            total_sum += packet.total_time();
            stats.total_time.bound(packet.total_time());

            if let Some(code) = packet.error() {
                stats.total_errors += 1;
                *stats.error_map.entry(code).or_insert(0) += 1;
            }

            if let Some((handle, process)) = packet.multipart_timings() {
                stats.multipart_count += 1;
                handle_sum += handle;
                process_sum += process;
                stats.handle_time.bound(handle);
                stats.process_time.bound(process);
            }
        }

        stats.total_time.average = Some(total_sum / stats.total_requests as f64);
        if stats.multipart_count > 0 {
            let k = stats.multipart_count as f64;
            stats.handle_time.average = Some(handle_sum / k);
            stats.process_time.average = Some(process_sum / k);
        }
        stats
    }

    /// Reduces child snapshots into one parent. Counts and error maps are summed,
    /// bounds merged, and the children's averages averaged: total time over all
    /// children, handle/process time over the children that saw multipart traffic.
    pub fn from_snapshots(children: &[Statistics], now: DateTime<Local>) -> Self {
        let (Some(first), Some(last)) = (children.first(), children.last()) else {
            return Self::empty(now, now);
        };
        let mut stats = Self::empty(first.start, last.end);

        let mut total_sum = 0.0;
        let mut handle_sum = 0.0;
        let mut process_sum = 0.0;
        let mut multipart_children = 0usize;

        for child in children {
            stats.total_requests += child.total_requests;
            stats.total_errors += child.total_errors;
            stats.multipart_count += child.multipart_count;
            for (code, count) in &child.error_map {
                *stats.error_map.entry(*code).or_insert(0) += count;
            }

            total_sum += child.total_time.average.unwrap_or(0.0);
            stats.total_time.merge_bounds(&child.total_time);

            if child.multipart_count > 0 {
                multipart_children += 1;
                handle_sum += child.handle_time.average.unwrap_or(0.0);
                process_sum += child.process_time.average.unwrap_or(0.0);
                stats.handle_time.merge_bounds(&child.handle_time);
                stats.process_time.merge_bounds(&child.process_time);
            }
        }

        if stats.total_requests > 0 {
            stats.total_time.average = Some(total_sum / children.len() as f64);
        }
        if multipart_children > 0 {
            let k = multipart_children as f64;
            stats.handle_time.average = Some(handle_sum / k);
            stats.process_time.average = Some(process_sum / k);
        }
        stats
    }

    /// Share of failed requests, `None` without traffic.
    pub fn error_percentage(&self) -> Option<f64> {
        (self.total_requests > 0).then(|| self.total_errors as f64 / self.total_requests as f64)
    }

    /// Projects the snapshot into its external view, backfilling measures that
    /// have no samples with `baseline` ± 5% noise.
    pub fn format(&self, baseline: &Baseline, noise: &mut dyn NoiseSource) -> StatisticsView {
        let (average_handle_time, min_max_handle_time) =
            format_measure(&self.handle_time, baseline.handle_time, noise);
        let (average_process_time, min_max_process_time) =
            format_measure(&self.process_time, baseline.process_time, noise);
        let error_percentage = match self.error_percentage() {
            Some(p) => round2(p),
            None => jitter(baseline.error_percentage, noise),
        };

        StatisticsView {
            timestamp: self.start,
            average_handle_time,
            min_max_handle_time,
            average_process_time,
            min_max_process_time,
            error_percentage,
        }
    }

    /// Persisted record, or `None` when the window saw no traffic.
    pub fn to_log_data(&self) -> Option<LogData> {
        let error_percentage = self.error_percentage()?;
        let multipart = self.multipart_count > 0;

        Some(LogData {
            overview: LogOverview {
                total_requests: self.total_requests,
                total_errors: self.total_errors,
                error_percentage: round2(error_percentage),
            },
            timings: LogTimings {
                average_total_time: round2(self.total_time.average.unwrap_or(0.0)),
                min_max_total_time: Some(self.total_time.min_max()),
                average_handle_time: round2(self.handle_time.average.unwrap_or(0.0)),
                min_max_handle_time: multipart.then(|| self.handle_time.min_max()),
                average_process_time: round2(self.process_time.average.unwrap_or(0.0)),
                min_max_process_time: multipart.then(|| self.process_time.min_max()),
            },
            error_map: self
                .error_map
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
        })
    }

    /// `"<start> - <end>"` key used inside persisted sections.
    pub fn range_key(&self) -> String {
        format!(
            "{} - {}",
            self.start.format(RANGE_FORMAT),
            self.end.format(RANGE_FORMAT)
        )
    }
}

fn format_measure(
    measure: &Measure,
    baseline: f64,
    noise: &mut dyn NoiseSource,
) -> (f64, MinMax) {
    let average = match measure.average {
        Some(avg) => round2(avg),
        None => jitter(baseline, noise),
    };
    let min = match measure.min {
        Some(min) => min,
        None => jitter((average - SYNTHETIC_SPREAD).max(0.0), noise),
    };
    let max = match measure.max {
        Some(max) => max,
        None => jitter(average + SYNTHETIC_SPREAD, noise),
    };
    (average, [Some(min), Some(max)])
}
