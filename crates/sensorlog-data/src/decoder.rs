//! Line-oriented decoder for sensor log files.
//!
//! Turns the byte stream of one log file into [`Record`]s. The decoder does
//! not look for a fixed header token: the data table starts at the first
//! line whose prefix parses as a timestamp, and everything before it is
//! discarded. This keeps old and new firmware headers (and headerless
//! files) working without special cases.

use std::borrow::Cow;
use std::io::BufRead;
use std::iter::FusedIterator;

use sensorlog_core::error::{ReportError, Result};
use sensorlog_core::models::{Record, RunConfig};
use sensorlog_core::time_utils::{parse_timestamp, timestamp_width};
use tracing::{debug, error, warn};

/// Average size of one data line in bytes, used to pre-size buffers.
pub const AVG_LINE_SIZE: u64 = 140;

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Why a line produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The data table has not started yet.
    BeforeDataTable,
    /// The timestamp lies outside the reporting window.
    OutOfWindow,
    /// Empty or whitespace-only line inside the data table of a silent run.
    Blank,
    /// The line could not be decoded and the run is silent.
    Malformed,
}

/// Result of decoding a single line.
#[derive(Debug)]
pub enum LineOutcome {
    Record(Record),
    Skipped(SkipReason),
    /// Only produced in strict mode; carries the offending line.
    Failed(ReportError),
}

/// Per-file counters collected while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub lines_read: u64,
    pub header_lines: u64,
    pub blank_lines: u64,
    pub out_of_window: u64,
    pub malformed_skipped: u64,
    pub records: u64,
    /// `false` when no line of the file ever parsed as a timestamp.
    pub header_found: bool,
}

// ── LineDecoder ───────────────────────────────────────────────────────────────

/// Decodes one log file into a lazy, forward-only sequence of [`Record`]s.
///
/// Use one decoder per file. Iterating yields `Ok(record)` for every decoded
/// in-window line. In strict mode the first malformed data line yields an
/// `Err` and the iterator ends there.
pub struct LineDecoder<'a, R> {
    reader: R,
    config: &'a RunConfig,
    timestamp_width: usize,
    min_fields: usize,
    in_data_table: bool,
    line_buf: Vec<u8>,
    line_number: u64,
    approx_lines: usize,
    finished: bool,
    stats: DecodeStats,
}

impl<'a, R: BufRead> LineDecoder<'a, R> {
    /// Create a decoder over `reader`.
    ///
    /// Fails only when the configured timestamp pattern is unusable.
    pub fn new(reader: R, config: &'a RunConfig) -> Result<Self> {
        let timestamp_width = timestamp_width(&config.timestamp_pattern)?;
        Ok(Self {
            reader,
            config,
            timestamp_width,
            min_fields: config.min_field_count(),
            in_data_table: false,
            line_buf: Vec::with_capacity(AVG_LINE_SIZE as usize),
            line_number: 0,
            approx_lines: 0,
            finished: false,
            stats: DecodeStats::default(),
        })
    }

    /// Pre-size the output for a stream of roughly `bytes` bytes.
    ///
    /// Only affects allocation, never the decoded records.
    pub fn with_size_hint(mut self, bytes: u64) -> Self {
        self.approx_lines = usize::try_from(bytes / AVG_LINE_SIZE).unwrap_or(0);
        self
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// `true` once a line has been recognised as the start of the data table.
    pub fn header_found(&self) -> bool {
        self.stats.header_found
    }

    /// Decode the whole stream into a vector.
    ///
    /// In strict mode a malformed line fails the whole file and none of the
    /// records decoded so far are returned.
    pub fn collect_records(mut self) -> Result<(Vec<Record>, DecodeStats)> {
        let mut records = Vec::with_capacity(self.approx_lines);
        for item in self.by_ref() {
            records.push(item?);
        }
        Ok((records, self.stats))
    }

    /// Decode one line (without its line terminator).
    ///
    /// Lines must be fed in file order: the first line that starts with a
    /// valid timestamp switches the decoder into the data table for good.
    pub fn decode_line(&mut self, line: &str) -> LineOutcome {
        self.line_number += 1;
        self.stats.lines_read += 1;

        if !self.in_data_table {
            if !self.starts_data_table(line) {
                self.stats.header_lines += 1;
                return LineOutcome::Skipped(SkipReason::BeforeDataTable);
            }
            debug!("data table starts at line {}", self.line_number);
            self.in_data_table = true;
            self.stats.header_found = true;
        }

        if line.trim().is_empty() {
            self.stats.blank_lines += 1;
            if self.config.silent {
                debug!("skipping blank line {}", self.line_number);
                return LineOutcome::Skipped(SkipReason::Blank);
            }
            error!("blank line {} inside the data table", self.line_number);
            return LineOutcome::Failed(ReportError::LineDecode {
                line_number: self.line_number,
                line: line.to_string(),
                reason: "blank line".to_string(),
            });
        }

        match self.parse_data_line(line) {
            Ok(Some(record)) => {
                self.stats.records += 1;
                LineOutcome::Record(record)
            }
            Ok(None) => {
                self.stats.out_of_window += 1;
                debug!("skipping line outside of period: {}", line);
                LineOutcome::Skipped(SkipReason::OutOfWindow)
            }
            Err(reason) if self.config.silent => {
                self.stats.malformed_skipped += 1;
                warn!(
                    "skipping malformed line {} ({}): {}",
                    self.line_number, reason, line
                );
                LineOutcome::Skipped(SkipReason::Malformed)
            }
            Err(reason) => {
                error!("failed to decode line {}: {}", self.line_number, line);
                LineOutcome::Failed(ReportError::LineDecode {
                    line_number: self.line_number,
                    line: line.to_string(),
                    reason,
                })
            }
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// A line opens the data table when it is long enough to hold a full
    /// timestamp and that prefix parses under the configured pattern.
    fn starts_data_table(&self, line: &str) -> bool {
        line.get(..self.timestamp_width)
            .and_then(|prefix| parse_timestamp(prefix, &self.config.timestamp_pattern))
            .is_some()
    }

    /// `Ok(None)` means the line is valid but outside the reporting window.
    fn parse_data_line(&self, line: &str) -> std::result::Result<Option<Record>, String> {
        // A single trailing separator ends the line and opens no field. Other
        // empty tokens are kept so that column positions never shift.
        let separator = self.config.field_separator;
        let body = line.trim_end();
        let body = body.strip_suffix(separator).unwrap_or(body);
        let fields: Vec<&str> = body.split(separator).collect();

        let raw_ts = fields[0].trim();
        let timestamp = parse_timestamp(raw_ts, &self.config.timestamp_pattern)
            .ok_or_else(|| format!("invalid timestamp \"{}\"", raw_ts))?;

        if !self.config.contains(timestamp) {
            return Ok(None);
        }

        if fields.len() < self.min_fields {
            return Err(format!(
                "expected at least {} fields, found {}",
                self.min_fields,
                fields.len()
            ));
        }

        let values = self
            .config
            .value_column_indices
            .iter()
            .map(|&ix| self.parse_number(fields[ix], ix))
            .collect::<std::result::Result<Vec<f32>, String>>()?;

        let cable_ix = fields.len() - 2;
        let element_ix = fields.len() - 1;
        let heating_cable_on = self.parse_number(fields[cable_ix], cable_ix)? != 0.0;
        let heating_element_on = self.parse_number(fields[element_ix], element_ix)? != 0.0;

        Ok(Some(Record {
            timestamp,
            values,
            heating_cable_on,
            heating_element_on,
        }))
    }

    /// Parse a numeric field, translating the configured decimal separator.
    fn parse_number(&self, raw: &str, column: usize) -> std::result::Result<f32, String> {
        let raw = raw.trim();
        let decimal = self.config.decimal_separator;
        let normalised: Cow<'_, str> = if decimal != '.' && raw.contains(decimal) {
            Cow::Owned(raw.replace(decimal, "."))
        } else {
            Cow::Borrowed(raw)
        };
        normalised
            .parse::<f32>()
            .map_err(|_| format!("invalid number \"{}\" in column {}", raw, column))
    }
}

impl<R: BufRead> Iterator for LineDecoder<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.line_buf.clear();
            match self.reader.read_until(b'\n', &mut self.line_buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ReportError::Io(e)));
                }
            }

            let raw = std::mem::take(&mut self.line_buf);
            let outcome = {
                let text = String::from_utf8_lossy(&raw);
                self.decode_line(text.trim_end_matches(|c: char| c == '\n' || c == '\r'))
            };
            self.line_buf = raw;

            match outcome {
                LineOutcome::Record(record) => return Some(Ok(record)),
                LineOutcome::Skipped(_) => continue,
                LineOutcome::Failed(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: BufRead> FusedIterator for LineDecoder<'_, R> {}

// ── Tests ─────────────────────────────────────────────────────────────────────
