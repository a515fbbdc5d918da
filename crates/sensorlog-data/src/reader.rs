//! Log file discovery and loading.
//!
//! The logger starts a new file every time it is restarted and names it after
//! the moment it was opened (`2018.02.14_12_05.csv`). Discovery relies on
//! that name to order files and to pick the ones that can overlap a period.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use sensorlog_core::error::{ReportError, Result};
use sensorlog_core::models::{Granularity, Record, RunConfig};
use tracing::{debug, warn};

use crate::decoder::{DecodeStats, LineDecoder};

/// Extension of files written by the logger.
pub const LOG_EXTENSION: &str = "csv";

/// strftime pattern of a log file's stem.
pub const FILE_NAME_PATTERN: &str = "%Y.%m.%d_%H_%M";

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Start time encoded in a log file's name, if it follows the logger's scheme.
pub fn file_start_time(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDateTime::parse_from_str(stem, FILE_NAME_PATTERN).ok()
}

/// Find every log file under `dir`, oldest first.
///
/// Files whose name does not carry a start time are ignored.
pub fn find_log_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Logs directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<(NaiveDateTime, PathBuf)> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(LOG_EXTENSION))
                    .unwrap_or(false)
        })
        .filter_map(|entry| {
            let path = entry.into_path();
            match file_start_time(&path) {
                Some(start) => Some((start, path)),
                None => {
                    debug!("Skipping file with unexpected name: {}", path.display());
                    None
                }
            }
        })
        .collect();

    files.sort();
    files.into_iter().map(|(_, path)| path).collect()
}

/// Keep the files whose name lies between `from` and `to`.
///
/// Names only carry minutes, so both bounds are compared at minute
/// precision, exactly as the names themselves would sort.
pub fn filter_by_period(files: Vec<PathBuf>, from: NaiveDateTime, to: NaiveDateTime) -> Vec<PathBuf> {
    let from = Granularity::Minutely.truncate(from);
    let to = Granularity::Minutely.truncate(to);

    files
        .into_iter()
        .filter(|path| {
            file_start_time(path)
                .map(|start| start >= from && start <= to)
                .unwrap_or(false)
        })
        .collect()
}

/// Discover the log files under `dir` relevant to the configured period.
pub fn select_log_files(dir: &Path, config: &RunConfig) -> Result<Vec<PathBuf>> {
    let all = find_log_files(dir);
    let total = all.len();
    let selected = filter_by_period(all, config.date_from, config.date_to);

    debug!(
        "Selected {} of {} log files in {}",
        selected.len(),
        total,
        dir.display()
    );

    if selected.is_empty() {
        return Err(ReportError::NoLogFiles(dir.to_path_buf()));
    }
    Ok(selected)
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Decode one log file completely.
///
/// Nothing is returned for a file that fails part way through, so a strict
/// run never commits a partial file.
pub fn decode_file(path: &Path, config: &RunConfig) -> Result<(Vec<Record>, DecodeStats)> {
    let to_file_error = |source: std::io::Error| ReportError::FileRead {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(to_file_error)?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);

    LineDecoder::new(BufReader::new(file), config)?
        .with_size_hint(size)
        .collect_records()
        .map_err(|e| match e {
            ReportError::Io(source) => to_file_error(source),
            other => other,
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
