use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

// ── Record ────────────────────────────────────────────────────────────────────

/// One row of sensor measurements, either decoded from a log line or
/// produced by averaging a bucket of such rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Local wall-clock time of the measurement, second resolution.
    pub timestamp: NaiveDateTime,
    /// One value per configured channel, in channel order.
    pub values: Vec<f32>,
    /// Heating cable indicator.
    #[serde(default)]
    pub heating_cable_on: bool,
    /// Heating element indicator.
    #[serde(default)]
    pub heating_element_on: bool,
}

impl Record {
    /// Build a record with both heating flags off.
    pub fn new(timestamp: NaiveDateTime, values: Vec<f32>) -> Self {
        Self {
            timestamp,
            values,
            heating_cable_on: false,
            heating_element_on: false,
        }
    }

    /// Builder-style setter for the two heating flags.
    pub fn with_flags(mut self, heating_cable_on: bool, heating_element_on: bool) -> Self {
        self.heating_cable_on = heating_cable_on;
        self.heating_element_on = heating_element_on;
        self
    }

    /// Number of channels carried by this record.
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }
}

// ── Granularity ───────────────────────────────────────────────────────────────

/// Width of one output bucket, or `Straight` for no bucketing at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Every decoded record is passed through unchanged.
    #[default]
    Straight,
    /// One averaged record per calendar minute.
    Minutely,
    /// One averaged record per calendar hour.
    Hourly,
    /// One averaged record per calendar day.
    Daily,
}

impl Granularity {
    /// All variants, in increasing bucket width.
    pub const ALL: [Granularity; 4] = [
        Granularity::Straight,
        Granularity::Minutely,
        Granularity::Hourly,
        Granularity::Daily,
    ];

    /// Lower-case name used on the command line and in persisted settings.
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Straight => "straight",
            Granularity::Minutely => "minutely",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }

    /// Human-readable report name.
    pub fn description(self) -> &'static str {
        match self {
            Granularity::Straight => "Raw records",
            Granularity::Minutely => "Per-minute averages",
            Granularity::Hourly => "Hourly averages",
            Granularity::Daily => "Daily averages",
        }
    }

    /// `true` for the variants that average records into buckets.
    pub fn is_averaging(self) -> bool {
        !matches!(self, Granularity::Straight)
    }

    /// Width of one bucket, or `None` for `Straight`.
    pub fn unit(self) -> Option<TimeDelta> {
        match self {
            Granularity::Straight => None,
            Granularity::Minutely => Some(TimeDelta::minutes(1)),
            Granularity::Hourly => Some(TimeDelta::hours(1)),
            Granularity::Daily => Some(TimeDelta::days(1)),
        }
    }

    /// Zero every time component finer than the bucket width.
    ///
    /// `Minutely` drops seconds, `Hourly` drops minutes and seconds and
    /// `Daily` rounds down to midnight. `Straight` returns `ts` unchanged.
    pub fn truncate(self, ts: NaiveDateTime) -> NaiveDateTime {
        let (hour, minute) = match self {
            Granularity::Straight => return ts,
            Granularity::Minutely => (ts.hour(), ts.minute()),
            Granularity::Hourly => (ts.hour(), 0),
            Granularity::Daily => (0, 0),
        };
        ts.date().and_hms_opt(hour, minute, 0).unwrap_or(ts)
    }

    /// Exclusive upper bound of the bucket containing `ts`.
    ///
    /// Saturates at [`NaiveDateTime::MAX`] so that a record at the very end
    /// of the representable range still gets a bucket.
    pub fn next_cutoff(self, ts: NaiveDateTime) -> NaiveDateTime {
        match self.unit() {
            Some(unit) => self
                .truncate(ts)
                .checked_add_signed(unit)
                .unwrap_or(NaiveDateTime::MAX),
            None => ts,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "straight" => Ok(Granularity::Straight),
            "minutely" => Ok(Granularity::Minutely),
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            _ => Err(ReportError::InvalidGranularity(s.to_string())),
        }
    }
}

// ── RunConfig ─────────────────────────────────────────────────────────────────

/// Raw column indices read into `Record::values` by the current logger
/// firmware. Column 20 is unused and column 28 sits between 25 and 26.
pub const DEFAULT_VALUE_COLUMNS: [usize; 31] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 21, 22, 23, 24, 25, 28,
    26, 27, 29, 30, 31, 32,
];

/// Timestamp + 33 fields. Older firmware lines carry exactly this many; newer
/// ones add a column before the flags.
pub const DEFAULT_EXPECTED_COLUMNS: usize = 34;

/// Timestamp plus the two trailing flag fields.
const MIN_LINE_FIELDS: usize = 3;

/// Strftime equivalent of `yyyy.MM.dd_HH:mm:ss`.
pub const DEFAULT_TIMESTAMP_PATTERN: &str = "%Y.%m.%d_%H:%M:%S";

/// Everything the decoder and the aggregator need to know about one run.
///
/// Built once by the caller and shared read-only by every per-file decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Inclusive lower bound of the reporting window.
    pub date_from: NaiveDateTime,
    /// Inclusive upper bound of the reporting window.
    pub date_to: NaiveDateTime,
    pub granularity: Granularity,
    /// Skip malformed data lines instead of failing the file.
    pub silent: bool,
    pub field_separator: char,
    pub decimal_separator: char,
    /// Chrono strftime pattern of the first field of every data line.
    pub timestamp_pattern: String,
    /// Raw column index for each output channel, in channel order.
    pub value_column_indices: Vec<usize>,
    /// Minimum number of fields a data line must have.
    pub expected_column_count: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            date_from: NaiveDateTime::MIN,
            date_to: NaiveDateTime::MAX,
            granularity: Granularity::default(),
            silent: true,
            field_separator: ';',
            decimal_separator: ',',
            timestamp_pattern: DEFAULT_TIMESTAMP_PATTERN.to_string(),
            value_column_indices: DEFAULT_VALUE_COLUMNS.to_vec(),
            expected_column_count: DEFAULT_EXPECTED_COLUMNS,
        }
    }
}

impl RunConfig {
    /// Default layout over the inclusive window `[date_from, date_to]`.
    pub fn new(date_from: NaiveDateTime, date_to: NaiveDateTime, granularity: Granularity) -> Self {
        Self {
            date_from,
            date_to,
            granularity,
            ..Self::default()
        }
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_separators(mut self, field: char, decimal: char) -> Self {
        self.field_separator = field;
        self.decimal_separator = decimal;
        self
    }

    pub fn with_timestamp_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.timestamp_pattern = pattern.into();
        self
    }

    pub fn with_columns(mut self, indices: Vec<usize>, expected_column_count: usize) -> Self {
        self.value_column_indices = indices;
        self.expected_column_count = expected_column_count;
        self
    }

    /// `true` when `ts` lies inside the inclusive reporting window.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.date_from && ts <= self.date_to
    }

    /// Number of channels every record of this run carries.
    pub fn channel_count(&self) -> usize {
        self.value_column_indices.len()
    }

    /// Fewest fields a data line can have and still be decoded.
    ///
    /// Every configured value column must exist. The flags are read from the
    /// last two fields, which on the shortest lines may also be value columns.
    pub fn min_field_count(&self) -> usize {
        let by_values = self
            .value_column_indices
            .iter()
            .max()
            .map(|&ix| ix + 1)
            .unwrap_or(0);
        self.expected_column_count.max(by_values).max(MIN_LINE_FIELDS)
    }

    /// Reject configurations the decoder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.date_to <= self.date_from {
            return Err(ReportError::InvalidPeriod {
                from: self.date_from,
                to: self.date_to,
            });
        }
        if self.value_column_indices.is_empty() {
            return Err(ReportError::Config("value column list is empty".to_string()));
        }
        if self.value_column_indices.contains(&0) {
            return Err(ReportError::Config(
                "column 0 holds the timestamp and cannot be a value column".to_string(),
            ));
        }
        if self.field_separator == self.decimal_separator {
            return Err(ReportError::Config(format!(
                "field and decimal separators are both '{}'",
                self.field_separator
            )));
        }
        if self.timestamp_pattern.is_empty() {
            return Err(ReportError::Config("timestamp pattern is empty".to_string()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
