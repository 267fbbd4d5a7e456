// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use procstats::error::SpawnError;
use procstats::models::*;
use procstats::supervisor::{WorkerControl, WorkerEvent, WorkerHandle, WorkerLauncher, WorkerManifest};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, s).single().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn log_data(total_requests: u64, total_errors: u64, handle: f64, process: f64) -> LogData {
    LogData {
        overview: LogOverview {
            total_requests,
            total_errors,
            error_percentage: if total_requests == 0 {
                0.0
            } else {
                total_errors as f64 / total_requests as f64
            },
        },
        timings: LogTimings {
            average_total_time: handle + process,
            min_max_total_time: None,
            average_handle_time: handle,
            min_max_handle_time: None,
            average_process_time: process,
            min_max_process_time: None,
        },
        error_map: Default::default(),
    }
}

/// Writes `logs/DD-MM-YYYY-overview.json` with one overview entry per item.
pub fn write_overview_file(dir: &Path, date: NaiveDate, entries: &[(&str, Option<LogData>)]) {
    let mut log = DailyLog::default();
    for (range, data) in entries {
        log.overview.insert(range.to_string(), data.clone());
    }
    let path = procstats::log_history::overview_log_path(dir, date);
    std::fs::write(path, serde_json::to_string(&log).unwrap()).unwrap();
}

/// Worker directory with a package.json manifest.
pub fn worker_dir(name: &str, version: &str) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        serde_json::json!({ "name": name, "version": version }).to_string(),
    )
    .unwrap();
    dir
}

/// In-memory launcher: each launch hands the test a sender to script worker events.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub launches: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    pub workers: Arc<Mutex<Vec<mpsc::Sender<WorkerEvent>>>>,
    pub sent: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl FakeLauncher {
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Event sender of the most recently launched worker.
    pub fn current(&self) -> mpsc::Sender<WorkerEvent> {
        self.workers.lock().unwrap().last().cloned().unwrap()
    }
}

struct FakeControl {
    kills: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl WorkerControl for FakeControl {
    fn kill(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&mut self, message: &serde_json::Value) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(&self, _manifest: &WorkerManifest) -> Result<WorkerHandle, SpawnError> {
        let (tx, rx) = mpsc::channel(64);
        self.workers.lock().unwrap().push(tx);
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(WorkerHandle::new(
            rx,
            Box::new(FakeControl {
                kills: self.kills.clone(),
                sent: self.sent.clone(),
            }),
        ))
    }
}
