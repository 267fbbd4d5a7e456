// Read-modify-write of the per-day JSON document. Writes land in a temporary
// sibling first and are renamed over the target.

use anyhow::Context;
use std::path::Path;
use tracing::instrument;

use super::Statistics;
use crate::models::{DailyLog, LogSection};

/// chrono format of each side of a range key: `DD/MM/YYYY HH:MM:SS`.
pub const RANGE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Section a snapshot is persisted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLabel {
    Hourly,
    Overview,
}

impl LogLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLabel::Hourly => "hourly",
            LogLabel::Overview => "overview",
        }
    }

    fn section_mut<'a>(&self, log: &'a mut DailyLog) -> &'a mut LogSection {
        match self {
            LogLabel::Hourly => &mut log.hourly,
            LogLabel::Overview => &mut log.overview,
        }
    }
}

impl Statistics {
    /// Inserts (or overwrites) this snapshot under `label` in the document at
    /// `path`. Windows without traffic are stored as `null`.
    #[instrument(skip(self), fields(operation = "export", label = label.as_str()))]
    pub fn export(&self, path: &Path, label: LogLabel) -> anyhow::Result<()> {
        let mut log = read_daily_log(path)?;
        label
            .section_mut(&mut log)
            .insert(self.range_key(), self.to_log_data());
        write_daily_log(path, &log)
    }
}

/// Loads a daily document; a missing file is an empty document.
pub fn read_daily_log(path: &Path) -> anyhow::Result<DailyLog> {
    if !path.exists() {
        return Ok(DailyLog::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))
}

/// Serializes `log` next to `path` and atomically renames it into place.
pub fn write_daily_log(path: &Path, log: &DailyLog) -> anyhow::Result<()> {
    let json = serde_json::to_string(log)?;
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename onto {}", path.display()))?;
    Ok(())
}
