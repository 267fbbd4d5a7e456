// Live aggregation pipeline: raw packets → tick snapshots → hourly → daily.
// `Aggregator` is the synchronous state machine; `spawn` drives it from a tokio
// task on a wall-clock aligned interval. Readers only see published state.

mod query;
mod ring;
mod schedule;

pub use query::{AnalyticsQuery, AnalyticsState};
pub use ring::Ring;
pub use schedule::{TickPhase, TickSchedule};

use chrono::{DateTime, Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::log_history::{LogHistory, daily_log_path, overview_log_path};
use crate::models::{Packet, StatisticsView};
use crate::statistics::{Baseline, LogLabel, NoiseSource, Statistics};

/// Hourly snapshots kept for the last day.
const HOURLY_RING_CAPACITY: usize = 24;

/// Capacity of the supervisor → aggregator packet channel.
pub const PACKET_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub tick_interval: Duration,
    pub logs_dir: PathBuf,
    /// Skip all persistence (rings and queries still work).
    pub disable_logs: bool,
}

pub struct Aggregator {
    config: AggregatorConfig,
    schedule: TickSchedule,
    /// Single live raw buffer; swapped out on every tick.
    buffer: Vec<Packet>,
    tick: u32,
    window_start: DateTime<Local>,
    pending_hour: Vec<Statistics>,
    pending_day: Vec<Statistics>,
    latest: Ring<StatisticsView>,
    hourly: Ring<StatisticsView>,
    history: Arc<LogHistory>,
    baseline: Baseline,
    /// Calendar day whose hourly rollups feed the next daily rollup.
    day: NaiveDate,
    noise: Box<dyn NoiseSource + Send>,
    state_tx: watch::Sender<Arc<AnalyticsState>>,
}

impl Aggregator {
    /// Builds the pipeline at wall-clock time `now`. The tick counter is the
    /// number of ticks elapsed since local midnight and is re-derived from the
    /// clock on every tick, so rollups land on real hour and day boundaries.
    pub fn new(
        config: AggregatorConfig,
        history: LogHistory,
        noise: Box<dyn NoiseSource + Send>,
        now: DateTime<Local>,
    ) -> anyhow::Result<Self> {
        let schedule = TickSchedule::new(config.tick_interval)?;
        if !config.disable_logs && !config.logs_dir.is_dir() {
            warn!(
                dir = %config.logs_dir.display(),
                "logs directory does not exist; persistence will fail until it is created"
            );
        }

        let history = Arc::new(history);
        let baseline = Baseline::from_averages(history.average_timings().as_ref());
        let (state_tx, _) = watch::channel(Arc::new(AnalyticsState {
            latest: Vec::new(),
            hourly: Vec::new(),
            history: history.clone(),
        }));

        Ok(Self {
            tick: schedule.ticks_since_midnight(now.time()),
            latest: Ring::new(schedule.ticks_per_hour() as usize),
            hourly: Ring::new(HOURLY_RING_CAPACITY),
            schedule,
            config,
            buffer: Vec::new(),
            window_start: now,
            pending_hour: Vec::new(),
            pending_day: Vec::new(),
            history,
            baseline,
            day: now.date_naive(),
            noise,
            state_tx,
        })
    }

    pub fn schedule(&self) -> &TickSchedule {
        &self.schedule
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read handle over the state published after each tick.
    pub fn query(&self) -> AnalyticsQuery {
        AnalyticsQuery::new(self.state_tx.subscribe(), self.config.logs_dir.clone())
    }

    /// Buffers one packet; reduction happens on the next tick.
    pub fn on_request(&mut self, packet: Packet) {
        self.buffer.push(packet);
    }

    /// One tick: flush the raw buffer into a snapshot, then run whichever
    /// rollups the counter calls for. Returns the phase that ran.
    pub fn on_tick(&mut self, now: DateTime<Local>) -> TickPhase {
        let batch = std::mem::take(&mut self.buffer);
        let snapshot = Statistics::from_packets(&batch, self.window_start, now);
        self.window_start = now;

        self.latest
            .push(snapshot.format(&self.baseline, self.noise.as_mut()));
        self.pending_hour.push(snapshot);

        let (date, since_midnight) = self.schedule.slot(now);
        if date < self.day {
            debug!(%date, day = %self.day, "local clock is behind the open day");
        }
        // A later date counts past the end of the open day.
        let tick = if date > self.day {
            self.schedule.ticks_per_day() + since_midnight
        } else {
            since_midnight
        };
        let phase = self.schedule.phase(self.tick, tick);
        self.tick = since_midnight;

        match phase {
            TickPhase::Sampling => {}
            TickPhase::HourlyRollup => self.hourly_rollup(now),
            TickPhase::DailyRollup => {
                self.hourly_rollup(now);
                self.daily_rollup(now, date);
            }
        }

        self.publish();
        phase
    }

    #[instrument(skip(self, now), fields(operation = "hourly_rollup", tick = self.tick))]
    fn hourly_rollup(&mut self, now: DateTime<Local>) {
        if self.pending_hour.is_empty() {
            return;
        }
        let children = std::mem::take(&mut self.pending_hour);
        let hourly = Statistics::from_snapshots(&children, now);

        self.persist(&hourly, LogLabel::Hourly, self.day);
        self.hourly
            .push(hourly.format(&self.baseline, self.noise.as_mut()));
        debug!(total_requests = hourly.total_requests, "hourly rollup");
        self.pending_day.push(hourly);
    }

    /// Closes the open day and opens `next_day`. The open day only moves
    /// forward, so each calendar day is rolled up at most once.
    #[instrument(skip(self, now), fields(operation = "daily_rollup", tick = self.tick))]
    fn daily_rollup(&mut self, now: DateTime<Local>, next_day: NaiveDate) {
        let date = std::mem::replace(&mut self.day, next_day);
        let children = std::mem::take(&mut self.pending_day);
        let daily = Statistics::from_snapshots(&children, now);

        self.persist(&daily, LogLabel::Overview, date);
        info!(%date, "Exporting statistics gathered during the last day");
        info!(
            total_requests = daily.total_requests,
            total_errors = daily.total_errors,
            "{} requests in total",
            daily.total_requests
        );

        if !self.config.disable_logs {
            self.reload_history();
        }
    }

    /// Rebuilds history from disk and refreshes the backfill baseline.
    pub fn reload_history(&mut self) {
        let history = LogHistory::generate(&self.config.logs_dir);
        self.baseline = Baseline::from_averages(history.average_timings().as_ref());
        self.history = Arc::new(history);
        debug!(entries = self.history.entries().len(), baseline = ?self.baseline, "history reloaded");
    }

    fn persist(&self, stats: &Statistics, label: LogLabel, date: NaiveDate) {
        if self.config.disable_logs {
            return;
        }
        let mut paths = vec![daily_log_path(&self.config.logs_dir, date)];
        if label == LogLabel::Overview {
            paths.push(overview_log_path(&self.config.logs_dir, date));
        }
        for path in paths {
            if let Err(e) = stats.export(&path, label) {
                warn!(error = %e, file = %path.display(), label = label.as_str(), "failed to persist statistics");
            }
        }
    }

    /// Publishes immutable copies of the rings and history for readers.
    fn publish(&self) {
        self.state_tx.send_replace(Arc::new(AnalyticsState {
            latest: self.latest.to_vec(),
            hourly: self.hourly.to_vec(),
            history: self.history.clone(),
        }));
    }
}

/// Drives `aggregator` until `shutdown_rx` fires or the packet channel closes.
/// The first tick lands on the next wall-clock tick boundary.
pub fn spawn(
    mut aggregator: Aggregator,
    mut packet_rx: mpsc::Receiver<Packet>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = *aggregator.schedule();
        let first = tokio::time::Instant::now()
            + schedule.until_next_boundary(Local::now().time());
        let mut ticker = tokio::time::interval_at(first, schedule.tick_duration());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            tick_ms = schedule.tick_duration().as_millis() as u64,
            tick = aggregator.tick_count(),
            "Running analytics engine"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Everything enqueued before the tick fired belongs to this tick.
                    while let Ok(packet) = packet_rx.try_recv() {
                        aggregator.on_request(packet);
                    }
                    aggregator.on_tick(Local::now());
                }
                packet = packet_rx.recv() => {
                    match packet {
                        Some(packet) => aggregator.on_request(packet),
                        None => {
                            debug!("packet channel closed");
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("Aggregator shutting down");
                    break;
                }
            }
        }
    })
}
