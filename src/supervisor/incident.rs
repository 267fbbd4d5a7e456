// stderr incident trail: one plain-text file per error event, outside the statistics pipeline.

use anyhow::Context;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// `logs/error DD-MM-YYYY_HH-MM-SS-mmm.txt`
pub fn incident_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("error {}.txt", at.format("%d-%m-%Y_%H-%M-%S-%3f")))
}

/// Writes the raw stderr payload to its own file and returns the path.
pub fn write_incident(dir: &Path, at: DateTime<Local>, payload: &str) -> anyhow::Result<PathBuf> {
    let path = incident_path(dir, at);
    std::fs::write(&path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
