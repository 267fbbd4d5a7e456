// Aggregation pipeline: tick cadence, rings, rollups, persistence, queries

mod common;

use chrono::{Duration as ChronoDuration, Local, NaiveTime};
use common::{at, date, log_data};
use procstats::aggregator::*;
use procstats::error::QueryError;
use procstats::log_history::{LogHistory, Weekday, daily_log_path, overview_log_path};
use procstats::models::{DailyLog, HistoryEntry, Packet};
use procstats::statistics::{FixedNoise, LogLabel, Statistics, read_daily_log};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

fn config(logs_dir: &Path) -> AggregatorConfig {
    AggregatorConfig {
        tick_interval: Duration::from_secs(30),
        logs_dir: logs_dir.to_path_buf(),
        disable_logs: false,
    }
}

fn aggregator_at(logs_dir: &Path, start: chrono::DateTime<Local>) -> Aggregator {
    Aggregator::new(
        config(logs_dir),
        LogHistory::default(),
        Box::new(FixedNoise(0.0)),
        start,
    )
    .unwrap()
}

/// Runs ticks `from..from + n`, 30s apart after `start`, returning their phases.
fn run_ticks(
    aggregator: &mut Aggregator,
    start: chrono::DateTime<Local>,
    from: i64,
    n: i64,
) -> Vec<TickPhase> {
    (from..from + n)
        .map(|k| aggregator.on_tick(start + ChronoDuration::seconds(30 * (k + 1))))
        .collect()
}

#[test]
fn test_ring_evicts_oldest_first() {
    let mut ring = Ring::new(3);
    assert!(ring.is_empty());
    for i in 0..3 {
        assert_eq!(ring.push(i), None);
    }
    assert_eq!(ring.push(3), Some(0));
    assert_eq!(ring.push(4), Some(1));
    assert_eq!(ring.len(), 3);
    assert_eq!(ring.capacity(), 3);
    assert_eq!(ring.to_vec(), vec![2, 3, 4]);
    assert_eq!(ring.iter().next(), Some(&2));
}

#[test]
fn test_schedule_thresholds_follow_interval() {
    let schedule = TickSchedule::new(Duration::from_secs(30)).unwrap();
    assert_eq!(schedule.ticks_per_hour(), 120);
    assert_eq!(schedule.ticks_per_day(), 2880);

    let schedule = TickSchedule::new(Duration::from_secs(60)).unwrap();
    assert_eq!(schedule.ticks_per_hour(), 60);
    assert_eq!(schedule.ticks_per_day(), 1440);

    assert!(TickSchedule::new(Duration::from_secs(7)).is_err());
    assert!(TickSchedule::new(Duration::ZERO).is_err());
}

#[test]
fn test_schedule_phases() {
    let schedule = TickSchedule::new(Duration::from_secs(30)).unwrap();
    assert_eq!(schedule.phase(0, 1), TickPhase::Sampling);
    assert_eq!(schedule.phase(118, 119), TickPhase::Sampling);
    assert_eq!(schedule.phase(119, 120), TickPhase::HourlyRollup);
    assert_eq!(schedule.phase(2759, 2760), TickPhase::HourlyRollup);
    assert_eq!(schedule.phase(2879, 2880), TickPhase::DailyRollup);
    assert_eq!(schedule.phase(2870, 2885), TickPhase::DailyRollup);
}

#[test]
fn test_schedule_phase_follows_wall_clock_jumps() {
    let schedule = TickSchedule::new(Duration::from_secs(30)).unwrap();
    // A stall skipped the 02:00 boundary.
    assert_eq!(schedule.phase(235, 245), TickPhase::HourlyRollup);
    // Same slot seen twice.
    assert_eq!(schedule.phase(120, 120), TickPhase::Sampling);
    // Clock set back from 01:59:30 to 01:00:00.
    assert_eq!(schedule.phase(239, 120), TickPhase::HourlyRollup);
    assert_eq!(schedule.phase(120, 121), TickPhase::Sampling);
}

#[test]
fn test_schedule_slot_tolerates_early_ticks() {
    let schedule = TickSchedule::new(Duration::from_secs(30)).unwrap();
    let early = at(2026, 10, 5, 23, 59, 59) + ChronoDuration::milliseconds(990);
    assert_eq!(schedule.slot(early), (date(2026, 10, 6), 0));
    assert_eq!(
        schedule.slot(at(2026, 10, 5, 11, 0, 15)),
        (date(2026, 10, 5), 1320)
    );
    assert_eq!(
        schedule.slot(at(2026, 10, 5, 10, 59, 45)),
        (date(2026, 10, 5), 1319)
    );
}

#[test]
fn test_schedule_wall_clock_alignment() {
    let schedule = TickSchedule::new(Duration::from_secs(30)).unwrap();
    let time = NaiveTime::from_hms_milli_opt(10, 15, 45, 500).unwrap();
    assert_eq!(schedule.ticks_since_midnight(time), 1231);
    assert_eq!(schedule.until_next_boundary(time), Duration::from_millis(14_500));

    let on_boundary = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    assert_eq!(
        schedule.until_next_boundary(on_boundary),
        Duration::from_secs(30)
    );
    assert_eq!(schedule.ticks_since_midnight(NaiveTime::MIN), 0);
}

#[test]
fn test_startup_resynchronizes_counter() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 10, 15, 45);
    let mut aggregator = aggregator_at(dir.path(), start);
    assert_eq!(aggregator.tick_count(), 1231);

    // 11:00 is tick 1320, 89 ticks away.
    let phases = run_ticks(&mut aggregator, start, 0, 89);
    assert!(phases[..88].iter().all(|p| *p == TickPhase::Sampling));
    assert_eq!(phases[88], TickPhase::HourlyRollup);
    assert_eq!(aggregator.tick_count(), 1320);
}

#[test]
fn test_latest_ring_keeps_one_hour_of_ticks() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 0, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);
    let query = aggregator.query();

    run_ticks(&mut aggregator, start, 0, 130);

    let latest = query.get_latest();
    assert_eq!(latest.count, 120);
    assert_eq!(latest.entries.len(), 120);
    assert_eq!(latest.range[0], start + ChronoDuration::seconds(300));
    assert_eq!(latest.range[1], start + ChronoDuration::seconds(30 * 129));
}

#[test]
fn test_queries_before_two_ticks_return_empty_form() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 0, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);
    let query = aggregator.query();

    assert_eq!(query.get_latest().count, 0);
    aggregator.on_tick(start + ChronoDuration::seconds(30));
    let latest = query.get_latest();
    assert_eq!(latest.count, 0);
    assert!(latest.entries.is_empty());
    assert_eq!(latest.range[0], latest.range[1]);

    aggregator.on_tick(start + ChronoDuration::seconds(60));
    assert_eq!(query.get_latest().count, 2);
    assert_eq!(query.get_hourly().count, 0);
}

#[test]
fn test_empty_ticks_are_backfilled_from_baseline() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 0, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);

    aggregator.on_request(Packet::multipart(200.0, 120.0, 30.0, None));
    assert_eq!(aggregator.buffered(), 1);
    run_ticks(&mut aggregator, start, 0, 2);
    assert_eq!(aggregator.buffered(), 0);

    let latest = aggregator.query().get_latest();
    assert_eq!(latest.entries[0].average_handle_time, 120.0);
    assert_eq!(latest.entries[0].error_percentage, 0.0);
    assert_eq!(latest.entries[1].average_handle_time, 150.0);
    assert_eq!(latest.entries[1].average_process_time, 15.0);
}

#[test]
fn test_baseline_comes_from_history_averages() {
    let dir = TempDir::new().unwrap();
    let history = LogHistory::new(vec![HistoryEntry {
        date: date(2026, 10, 4),
        data: log_data(100, 2, 200.0, 0.0),
    }]);
    let aggregator = Aggregator::new(
        config(dir.path()),
        history,
        Box::new(FixedNoise(0.0)),
        at(2026, 10, 5, 0, 0, 0),
    )
    .unwrap();

    assert_eq!(aggregator.baseline().handle_time, 200.0);
    assert_eq!(aggregator.baseline().process_time, 15.0);
    assert_eq!(aggregator.baseline().error_percentage, 0.02);
}

#[test]
fn test_hourly_rollup_persists_and_fills_hourly_ring() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 10, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);

    aggregator.on_request(Packet::network(100.0, None));
    aggregator.on_request(Packet::network(50.0, Some(500)));
    let phases = run_ticks(&mut aggregator, start, 0, 240);
    assert_eq!(phases[119], TickPhase::HourlyRollup);
    assert_eq!(phases[239], TickPhase::HourlyRollup);
    assert_eq!(
        phases
            .iter()
            .filter(|p| **p == TickPhase::HourlyRollup)
            .count(),
        2
    );

    let log = read_daily_log(&daily_log_path(dir.path(), date(2026, 10, 5))).unwrap();
    assert_eq!(log.hourly.len(), 2);
    assert!(log.overview.is_empty());
    let first = log.hourly["05/10/2026 10:00:00 - 05/10/2026 11:00:00"]
        .as_ref()
        .unwrap();
    assert_eq!(first.overview.total_requests, 2);
    assert_eq!(first.overview.total_errors, 1);
    assert_eq!(log.hourly["05/10/2026 11:00:00 - 05/10/2026 12:00:00"], None);

    let hourly = aggregator.query().get_hourly();
    assert_eq!(hourly.count, 2);
    assert_eq!(hourly.range[0], start);
}

#[test]
fn test_daily_rollup_runs_once_at_midnight() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 23, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);
    let query = aggregator.query();
    assert_eq!(aggregator.tick_count(), 2760);

    for _ in 0..3 {
        aggregator.on_request(Packet::multipart(200.0, 120.0, 30.0, None));
    }
    let phases = run_ticks(&mut aggregator, start, 0, 121);
    assert_eq!(phases[119], TickPhase::DailyRollup);
    assert_eq!(phases[120], TickPhase::Sampling);
    assert_eq!(
        phases
            .iter()
            .filter(|p| **p == TickPhase::DailyRollup)
            .count(),
        1
    );
    assert_eq!(aggregator.tick_count(), 1);

    let day = date(2026, 10, 5);
    let range = "05/10/2026 23:00:00 - 06/10/2026 00:00:00";
    let full = read_daily_log(&daily_log_path(dir.path(), day)).unwrap();
    assert!(full.hourly.contains_key(range));
    let overview = full.overview[range].as_ref().unwrap();
    assert_eq!(overview.overview.total_requests, 3);

    let sibling = read_daily_log(&overview_log_path(dir.path(), day)).unwrap();
    assert!(sibling.hourly.is_empty());
    assert_eq!(sibling.overview.len(), 1);

    // History was reloaded from the new files (the range is stored in both, counted once).
    assert_eq!(query.get_requests_per_weekday(true)[&Weekday::Monday], 1.0);
    assert_eq!(query.get_requests_per_weekday(false)[&Weekday::Monday], 3.0);
    assert_eq!(aggregator.baseline().handle_time, 120.0);
}

/// Ticks once at `now` with one buffered request.
fn tick_with_request(aggregator: &mut Aggregator, now: chrono::DateTime<Local>) -> TickPhase {
    aggregator.on_request(Packet::multipart(200.0, 120.0, 30.0, None));
    aggregator.on_tick(now)
}

fn overview_totals(dir: &Path, day: chrono::NaiveDate) -> Vec<(String, u64)> {
    read_daily_log(&overview_log_path(dir, day))
        .unwrap()
        .overview
        .into_iter()
        .map(|(range, data)| (range, data.map_or(0, |d| d.overview.total_requests)))
        .collect()
}

#[test]
fn test_repeated_hour_day_rolls_up_once_under_its_date() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 12, 0, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);

    // 00:00:30 ..= 01:59:30, then the wall clock falls back to 01:00:00
    // and runs on to midnight: a 25 hour day.
    let mut phases: Vec<TickPhase> = (1..240)
        .map(|k| tick_with_request(&mut aggregator, start + ChronoDuration::seconds(30 * k)))
        .collect();
    let repeat = at(2026, 10, 12, 1, 0, 0);
    phases.extend(
        (0..=2760).map(|k| tick_with_request(&mut aggregator, repeat + ChronoDuration::seconds(30 * k))),
    );
    assert_eq!(phases.len(), 3000);
    assert_eq!(phases[239], TickPhase::HourlyRollup);
    let daily: Vec<usize> = phases
        .iter()
        .enumerate()
        .filter(|(_, p)| **p == TickPhase::DailyRollup)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(daily, vec![2999]);

    assert_eq!(
        overview_totals(dir.path(), date(2026, 10, 12)),
        vec![("12/10/2026 00:00:00 - 13/10/2026 00:00:00".to_string(), 3000)]
    );

    // The following day is untouched by the repeated hour.
    let next = at(2026, 10, 13, 0, 0, 0);
    let phases: Vec<TickPhase> = (1..=2880)
        .map(|k| tick_with_request(&mut aggregator, next + ChronoDuration::seconds(30 * k)))
        .collect();
    assert_eq!(phases[2879], TickPhase::DailyRollup);
    assert_eq!(
        phases.iter().filter(|p| **p == TickPhase::DailyRollup).count(),
        1
    );
    assert_eq!(
        overview_totals(dir.path(), date(2026, 10, 13)),
        vec![("13/10/2026 00:00:00 - 14/10/2026 00:00:00".to_string(), 2880)]
    );
}

#[test]
fn test_clock_set_back_across_midnight_does_not_roll_up_twice() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 23, 0, 0);
    let mut aggregator = aggregator_at(dir.path(), start);

    let phases = run_ticks(&mut aggregator, start, 0, 120);
    assert_eq!(phases[119], TickPhase::DailyRollup);

    // Clock stepped back to the finished day, then past midnight again.
    let back = at(2026, 10, 5, 23, 59, 0);
    let mut counted = 0;
    let mut daily = 0;
    for k in 0..2883 {
        let phase = tick_with_request(&mut aggregator, back + ChronoDuration::seconds(30 * k));
        counted += 1;
        if phase == TickPhase::DailyRollup {
            daily += 1;
        }
    }
    // Only the midnight of the 7th closes a day.
    assert_eq!(daily, 1);

    assert_eq!(overview_totals(dir.path(), date(2026, 10, 5)).len(), 1);
    let next_day = overview_totals(dir.path(), date(2026, 10, 6));
    assert_eq!(next_day.len(), 1);
    assert_eq!(next_day[0].1, counted);
}

#[test]
fn test_late_first_tick_keeps_hours_on_the_hour() {
    let dir = TempDir::new().unwrap();
    let mut aggregator = aggregator_at(dir.path(), at(2026, 10, 5, 10, 59, 45));

    // The 11:00:00 boundary passed before the driver's first tick.
    let first = at(2026, 10, 5, 11, 0, 30);
    assert_eq!(aggregator.on_tick(first), TickPhase::HourlyRollup);
    assert_eq!(aggregator.tick_count(), 1321);

    let phases: Vec<TickPhase> = (1..=119)
        .map(|k| aggregator.on_tick(first + ChronoDuration::seconds(30 * k)))
        .collect();
    assert!(phases[..118].iter().all(|p| *p == TickPhase::Sampling));
    assert_eq!(phases[118], TickPhase::HourlyRollup);
    assert_eq!(aggregator.tick_count(), 1440);

    let log = read_daily_log(&daily_log_path(dir.path(), date(2026, 10, 5))).unwrap();
    assert!(log.hourly.contains_key("05/10/2026 11:00:30 - 05/10/2026 12:00:00"));
}

#[test]
fn test_disabled_logs_write_nothing() {
    let dir = TempDir::new().unwrap();
    let start = at(2026, 10, 5, 23, 0, 0);
    let mut aggregator = Aggregator::new(
        AggregatorConfig {
            disable_logs: true,
            ..config(dir.path())
        },
        LogHistory::default(),
        Box::new(FixedNoise(0.0)),
        start,
    )
    .unwrap();

    aggregator.on_request(Packet::network(10.0, None));
    run_ticks(&mut aggregator, start, 0, 120);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(aggregator.query().get_hourly().count, 0);
    assert_eq!(aggregator.tick_count(), 0);
}

#[test]
fn test_history_for_today_is_not_yet_available() {
    let dir = TempDir::new().unwrap();
    let today = Local::now().date_naive();
    std::fs::write(daily_log_path(dir.path(), today), "{}").unwrap();
    let query = aggregator_at(dir.path(), Local::now()).query();

    let key = today.format("%d-%m-%Y").to_string();
    let err = query.get_history(&key).unwrap_err();
    assert_eq!(err, QueryError::NotYetAvailable(key));
    assert_eq!(err.status(), 425);
}

#[test]
fn test_history_lookup_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("01-01-2021.json"), "{ garbage").unwrap();
    let query = aggregator_at(dir.path(), Local::now()).query();

    let err = query.get_history("01-01-2020").unwrap_err();
    assert_eq!(err, QueryError::NotFound("01-01-2020".into()));
    assert_eq!(err.status(), 404);

    let err = query.get_history("2020-01-01").unwrap_err();
    assert_eq!(err, QueryError::InvalidDate("2020-01-01".into()));
    assert_eq!(err.status(), 400);

    let err = query.get_history("01-01-2021").unwrap_err();
    assert_eq!(err, QueryError::Corrupted("01-01-2021".into()));
    assert_eq!(err.status(), 500);
}

#[test]
fn test_history_for_past_day_is_served() {
    let dir = TempDir::new().unwrap();
    let t0 = at(2026, 10, 5, 10, 0, 0);
    let t1 = at(2026, 10, 5, 11, 0, 0);
    Statistics::from_packets(&[Packet::network(10.0, None)], t0, t1)
        .export(&overview_log_path(dir.path(), date(2026, 10, 5)), LogLabel::Overview)
        .unwrap();
    let query = aggregator_at(dir.path(), Local::now()).query();

    let log: DailyLog = query.get_history("05-10-2026").unwrap();
    assert_eq!(log.overview.len(), 1);
    assert!(log.hourly.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_spawned_engine_ticks_and_drains_packets() {
    let dir = TempDir::new().unwrap();
    let aggregator = aggregator_at(dir.path(), Local::now());
    let query = aggregator.query();
    let (packet_tx, packet_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = spawn(aggregator, packet_rx, shutdown_rx);

    packet_tx
        .send(Packet::multipart(90.0, 80.0, 5.0, None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;

    let latest = query.get_latest();
    assert!(latest.count >= 2);
    assert_eq!(latest.entries[0].average_handle_time, 80.0);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_spawned_engine_stops_when_channel_closes() {
    let dir = TempDir::new().unwrap();
    let aggregator = aggregator_at(dir.path(), Local::now());
    let (packet_tx, packet_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = spawn(aggregator, packet_rx, shutdown_rx);

    drop(packet_tx);
    task.await.unwrap();
}
