// Tick cadence as a small state machine. Thresholds derive from the configured
// interval, so hourly and daily rollups stay in step with any valid interval.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, Timelike};
use std::time::Duration;

const MS_PER_HOUR: u64 = 3_600_000;
const HOURS_PER_DAY: u32 = 24;

/// What a tick has to do once its sampling step is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// Only the per-tick snapshot.
    Sampling,
    /// Hour boundary: roll the hour's tick snapshots up.
    HourlyRollup,
    /// End of day: roll the final hour, then the day's hourly snapshots.
    DailyRollup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    tick_ms: u64,
    ticks_per_hour: u32,
    ticks_per_day: u32,
}

impl TickSchedule {
    /// Fails unless `tick` is a whole number of milliseconds dividing one hour.
    pub fn new(tick: Duration) -> anyhow::Result<Self> {
        let tick_ms = tick.as_millis() as u64;
        anyhow::ensure!(tick_ms > 0, "tick interval must be > 0");
        anyhow::ensure!(
            MS_PER_HOUR % tick_ms == 0,
            "tick interval {tick_ms}ms must divide one hour evenly"
        );
        let ticks_per_hour = (MS_PER_HOUR / tick_ms) as u32;
        Ok(Self {
            tick_ms,
            ticks_per_hour,
            ticks_per_day: ticks_per_hour * HOURS_PER_DAY,
        })
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn ticks_per_hour(&self) -> u32 {
        self.ticks_per_hour
    }

    pub fn ticks_per_day(&self) -> u32 {
        self.ticks_per_day
    }

    /// Calendar date and tick index of the boundary a tick firing at `now`
    /// belongs to. Up to a quarter tick of early firing still counts as the
    /// boundary itself.
    pub fn slot(&self, now: DateTime<Local>) -> (NaiveDate, u32) {
        let slack = TimeDelta::milliseconds((self.tick_ms / 4) as i64);
        let at = now + slack;
        (at.date_naive(), self.ticks_since_midnight(at.time()))
    }

    /// Whole ticks elapsed since local midnight at `time`.
    pub fn ticks_since_midnight(&self, time: NaiveTime) -> u32 {
        (ms_since_midnight(time) / self.tick_ms) as u32
    }

    /// Delay from `time` until the next wall-clock tick boundary.
    pub fn until_next_boundary(&self, time: NaiveTime) -> Duration {
        let into_tick = ms_since_midnight(time) % self.tick_ms;
        Duration::from_millis(self.tick_ms - into_tick)
    }

    /// Classifies a tick that moved the counter from `previous` to `tick`.
    /// The hourly rollup runs on an hour boundary, or when a boundary was
    /// skipped; a tick landing on the same slot twice only samples.
    pub fn phase(&self, previous: u32, tick: u32) -> TickPhase {
        if tick >= self.ticks_per_day {
            TickPhase::DailyRollup
        } else if tick != previous
            && (tick % self.ticks_per_hour == 0
                || tick / self.ticks_per_hour != previous / self.ticks_per_hour)
        {
            TickPhase::HourlyRollup
        } else {
            TickPhase::Sampling
        }
    }
}

fn ms_since_midnight(time: NaiveTime) -> u64 {
    // Leap seconds report nanosecond >= 1e9; clamp into the same second.
    let millis = (time.nanosecond() / 1_000_000).min(999);
    time.num_seconds_from_midnight() as u64 * 1000 + millis as u64
}
