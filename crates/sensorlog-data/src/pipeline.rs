//! Report pipeline.
//!
//! Decodes the selected log files in order, feeds every file's records into
//! one [`ReportBuilder`] and returns the finished series together with run
//! metadata.

use std::io::BufRead;
use std::path::PathBuf;

use chrono::{NaiveDateTime, Utc};
use sensorlog_core::error::{ReportError, Result};
use sensorlog_core::models::{Granularity, Record, RunConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{create_builder, ReportBuilder};
use crate::decoder::{DecodeStats, LineDecoder};
use crate::reader::decode_file;

// ── Public types ──────────────────────────────────────────────────────────────

/// Counters describing one report run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportMetadata {
    /// RFC 3339 time at which the report was finished.
    pub generated_at: String,
    pub granularity: Granularity,
    pub date_from: NaiveDateTime,
    pub date_to: NaiveDateTime,
    pub files_processed: usize,
    /// Files in which no line ever parsed as a timestamp.
    pub files_without_data_table: usize,
    pub lines_read: u64,
    pub records_decoded: u64,
    pub lines_out_of_window: u64,
    pub malformed_lines_skipped: u64,
    /// Length of the finished series.
    pub records_emitted: usize,
    pub elapsed_seconds: f64,
}

/// The complete output of a report run.
#[derive(Debug, Clone)]
pub struct ReportResult {
    pub records: Vec<Record>,
    pub metadata: ReportMetadata,
}

// ── ReportRun ─────────────────────────────────────────────────────────────────

/// One report run in progress.
///
/// Sources must be added oldest first. Each source is decoded completely
/// before any of its records reach the builder, so a strict-mode failure
/// leaves the run without a partial file.
pub struct ReportRun<'a> {
    config: &'a RunConfig,
    builder: Box<dyn ReportBuilder>,
    metadata: ReportMetadata,
    started: std::time::Instant,
}

impl<'a> ReportRun<'a> {
    /// Start a run. Fails when `config` is unusable.
    pub fn new(config: &'a RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            builder: create_builder(config.granularity),
            metadata: ReportMetadata {
                granularity: config.granularity,
                date_from: config.date_from,
                date_to: config.date_to,
                ..ReportMetadata::default()
            },
            started: std::time::Instant::now(),
        })
    }

    /// Decode `reader` and fold its records into the report.
    pub fn add_source<R: BufRead>(&mut self, name: &str, reader: R, size_hint: u64) -> Result<()> {
        let (records, stats) = LineDecoder::new(reader, self.config)?
            .with_size_hint(size_hint)
            .collect_records()?;
        self.add_records(name, records, &stats);
        Ok(())
    }

    /// Fold a file that was already decoded.
    pub fn add_records(&mut self, name: &str, records: Vec<Record>, stats: &DecodeStats) {
        if !stats.header_found {
            warn!("No data table found in {}", name);
            self.metadata.files_without_data_table += 1;
        }
        if stats.malformed_skipped > 0 {
            warn!("Skipped {} malformed lines in {}", stats.malformed_skipped, name);
        }
        debug!(
            "{}: {} lines, {} records, {} out of window",
            name, stats.lines_read, stats.records, stats.out_of_window
        );

        self.metadata.files_processed += 1;
        self.metadata.lines_read += stats.lines_read;
        self.metadata.records_decoded += stats.records;
        self.metadata.lines_out_of_window += stats.out_of_window;
        self.metadata.malformed_lines_skipped += stats.malformed_skipped;

        self.builder.consume(records);
    }

    /// Records completed so far.
    pub fn emitted(&self) -> usize {
        self.builder.emitted()
    }

    /// Close the last bucket and return the report.
    ///
    /// Fails with [`ReportError::EmptyResult`] when nothing fell inside the
    /// reporting window.
    pub fn finish(self) -> Result<ReportResult> {
        let mut metadata = self.metadata;
        let records = self.builder.finish();

        if records.is_empty() {
            return Err(ReportError::EmptyResult);
        }

        metadata.records_emitted = records.len();
        metadata.generated_at = Utc::now().to_rfc3339();
        metadata.elapsed_seconds = self.started.elapsed().as_secs_f64();

        info!(
            "Built {} {} records from {} decoded in {} files",
            metadata.records_emitted,
            metadata.granularity,
            metadata.records_decoded,
            metadata.files_processed
        );

        Ok(ReportResult { records, metadata })
    }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Build a report from log files on disk, oldest first.
pub fn build_report(files: &[PathBuf], config: &RunConfig) -> Result<ReportResult> {
    let mut run = ReportRun::new(config)?;
    let total = files.len();

    for (i, path) in files.iter().enumerate() {
        info!("Processing file {}/{}: {}", i + 1, total, path.display());
        let (records, stats) = decode_file(path, config)?;
        run.add_records(&path.display().to_string(), records, &stats);
    }

    run.finish()
}

/// Build a report from in-memory or otherwise opened sources, oldest first.
pub fn build_report_from_readers<I, R>(sources: I, config: &RunConfig) -> Result<ReportResult>
where
    I: IntoIterator<Item = (String, R)>,
    R: BufRead,
{
    let mut run = ReportRun::new(config)?;
    for (name, reader) in sources {
        run.add_source(&name, reader, 0)?;
    }
    run.finish()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
