// Daily file naming: logs/DD-MM-YYYY.json and logs/DD-MM-YYYY-overview.json

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%d-%m-%Y";
const OVERVIEW_SUFFIX: &str = "-overview";
const EXTENSION: &str = ".json";

/// Day file holding both the `hourly` and `overview` sections.
pub fn daily_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{EXTENSION}", date.format(DATE_FORMAT)))
}

/// Sibling file holding only the daily rollup.
pub fn overview_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!(
        "{}{OVERVIEW_SUFFIX}{EXTENSION}",
        date.format(DATE_FORMAT)
    ))
}

/// Parses a `DD-MM-YYYY` date as used in file names and history queries.
pub fn parse_log_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Date embedded in a daily file name; `None` for anything else.
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(EXTENSION)?;
    let stem = stem.strip_suffix(OVERVIEW_SUFFIX).unwrap_or(stem);
    parse_log_date(stem)
}
