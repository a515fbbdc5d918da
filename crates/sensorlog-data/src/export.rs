//! Report export.
//!
//! Writes a finished series either as a semicolon-delimited table or as a
//! JSON array. The output is written next to its destination and renamed
//! into place, so an aborted run never leaves a half-written report.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sensorlog_core::error::{ReportError, Result};
use sensorlog_core::models::{Granularity, Record};
use tracing::{debug, info, warn};

/// Column delimiter of CSV reports.
pub const CSV_DELIMITER: u8 = b';';

// ── ExportFormat ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ReportError::Config(format!("unknown export format: {other}"))),
        }
    }
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// strftime pattern of the timestamp column for `granularity`.
pub fn timestamp_format(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "%d.%m.%Y",
        Granularity::Straight => "%d.%m.%Y %H:%M:%S",
        Granularity::Minutely | Granularity::Hourly => "%d.%m.%Y %H:%M",
    }
}

// ── Export ────────────────────────────────────────────────────────────────────

/// Delete a report left over from an earlier run.
pub fn remove_stale_report(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Removing stale report {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Write `records` to `path` in `format`.
///
/// Refuses an empty series with [`ReportError::EmptyResult`].
pub fn export_report(
    records: &[Record],
    granularity: Granularity,
    path: &Path,
    format: ExportFormat,
) -> Result<()> {
    if records.is_empty() {
        return Err(ReportError::EmptyResult);
    }

    info!("Exporting {} records to {}", records.len(), path.display());

    let tmp = temp_path(path);
    let written = match format {
        ExportFormat::Csv => write_csv(records, granularity, &tmp),
        ExportFormat::Json => write_json(records, &tmp),
    };

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e);
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_csv(records: &[Record], granularity: Granularity, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_path(path)?;

    let channels = records.iter().map(Record::channel_count).max().unwrap_or(0);
    let mut header = Vec::with_capacity(channels + 3);
    header.push("Timestamp".to_string());
    header.extend((1..=channels).map(|i| format!("ch{i}")));
    header.push("heating_cable".to_string());
    header.push("heating_element".to_string());
    writer.write_record(&header)?;

    let ts_format = timestamp_format(granularity);
    let mut row: Vec<String> = Vec::with_capacity(channels + 3);
    for record in records {
        row.clear();
        row.push(record.timestamp.format(ts_format).to_string());
        row.extend(record.values.iter().map(|v| v.to_string()));
        row.resize(channels + 1, String::new());
        row.push(flag(record.heating_cable_on).to_string());
        row.push(flag(record.heating_element_on).to_string());
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_json(records: &[Record], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    Ok(())
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
