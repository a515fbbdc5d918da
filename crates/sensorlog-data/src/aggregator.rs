//! Time-bucket aggregation of decoded records.
//!
//! A [`ReportBuilder`] is created once per run and fed every file's records
//! in file order. `Straight` runs pass records through unchanged; the other
//! granularities average them into calendar-aligned buckets.

use chrono::NaiveDateTime;
use sensorlog_core::models::{Granularity, Record};
use tracing::{debug, warn};

// ── ReportBuilder ─────────────────────────────────────────────────────────────

/// Shared contract of the pass-through and averaging builders.
pub trait ReportBuilder {
    /// Fold one record into the report. Records must arrive in time order.
    fn push(&mut self, record: Record);

    /// Fold a whole file's records, in order.
    fn consume(&mut self, records: Vec<Record>) {
        for record in records {
            self.push(record);
        }
    }

    /// Close any open bucket and hand back the finished series.
    fn finish(self: Box<Self>) -> Vec<Record>;

    fn granularity(&self) -> Granularity;

    /// Number of output records completed so far.
    fn emitted(&self) -> usize;
}

/// Pick the builder for `granularity`.
pub fn create_builder(granularity: Granularity) -> Box<dyn ReportBuilder> {
    match granularity {
        Granularity::Straight => Box::new(StraightReportBuilder::new()),
        other => Box::new(AvgReportBuilder::new(other)),
    }
}

// ── StraightReportBuilder ─────────────────────────────────────────────────────

/// Keeps every record exactly as decoded.
#[derive(Debug, Default)]
pub struct StraightReportBuilder {
    records: Vec<Record>,
}

impl StraightReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportBuilder for StraightReportBuilder {
    fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    fn consume(&mut self, records: Vec<Record>) {
        self.records.extend(records);
    }

    fn finish(self: Box<Self>) -> Vec<Record> {
        self.records
    }

    fn granularity(&self) -> Granularity {
        Granularity::Straight
    }

    fn emitted(&self) -> usize {
        self.records.len()
    }
}

// ── Bucket ────────────────────────────────────────────────────────────────────

/// Running totals of the records that fell into the open bucket.
#[derive(Debug)]
struct Bucket {
    first_timestamp: NaiveDateTime,
    sums: Vec<f32>,
    count: u32,
    heating_cable_on: bool,
    heating_element_on: bool,
}

impl Bucket {
    fn open(record: Record) -> Self {
        Self {
            first_timestamp: record.timestamp,
            sums: record.values,
            count: 1,
            heating_cable_on: record.heating_cable_on,
            heating_element_on: record.heating_element_on,
        }
    }

    fn add(&mut self, record: &Record) {
        if record.values.len() != self.sums.len() {
            warn!(
                "record at {} has {} channels, bucket has {}",
                record.timestamp,
                record.values.len(),
                self.sums.len()
            );
        }
        for (sum, value) in self.sums.iter_mut().zip(&record.values) {
            *sum += *value;
        }
        self.count += 1;
        self.heating_cable_on |= record.heating_cable_on;
        self.heating_element_on |= record.heating_element_on;
    }

    /// Per-channel mean, timestamped at the start of the bucket.
    fn close(self, granularity: Granularity) -> Record {
        let count = self.count as f32;
        Record {
            timestamp: granularity.truncate(self.first_timestamp),
            values: self.sums.into_iter().map(|sum| sum / count).collect(),
            heating_cable_on: self.heating_cable_on,
            heating_element_on: self.heating_element_on,
        }
    }
}

// ── AvgReportBuilder ──────────────────────────────────────────────────────────

/// Averages records into minute, hour or day buckets.
///
/// A bucket closes when a record at or after `next_cutoff` arrives. The next
/// cut-off is then re-anchored on that record rather than advanced one unit
/// at a time, so a gap in the data produces no empty buckets.
#[derive(Debug)]
pub struct AvgReportBuilder {
    granularity: Granularity,
    records: Vec<Record>,
    bucket: Option<Bucket>,
    next_cutoff: Option<NaiveDateTime>,
}

impl AvgReportBuilder {
    pub fn new(granularity: Granularity) -> Self {
        debug_assert!(granularity.is_averaging());
        Self {
            granularity,
            records: Vec::new(),
            bucket: None,
            next_cutoff: None,
        }
    }

    /// Exclusive upper bound of the open bucket; `None` before the first record.
    pub fn next_cutoff(&self) -> Option<NaiveDateTime> {
        self.next_cutoff
    }

    /// Number of raw records folded into the open bucket.
    pub fn buffered(&self) -> u32 {
        self.bucket.as_ref().map(|b| b.count).unwrap_or(0)
    }

    fn close_bucket(&mut self) {
        if let Some(bucket) = self.bucket.take() {
            let count = bucket.count;
            let record = bucket.close(self.granularity);
            debug!("closed {} bucket at {} ({} records)", self.granularity, record.timestamp, count);
            self.records.push(record);
        }
    }
}

impl ReportBuilder for AvgReportBuilder {
    fn push(&mut self, record: Record) {
        match self.next_cutoff {
            None => {
                self.next_cutoff = Some(self.granularity.next_cutoff(record.timestamp));
            }
            Some(cutoff) if record.timestamp >= cutoff => {
                self.close_bucket();
                self.next_cutoff = Some(self.granularity.next_cutoff(record.timestamp));
            }
            Some(_) => {}
        }

        match self.bucket.as_mut() {
            Some(bucket) => bucket.add(&record),
            None => self.bucket = Some(Bucket::open(record)),
        }
    }

    fn finish(mut self: Box<Self>) -> Vec<Record> {
        self.close_bucket();
        self.records
    }

    fn granularity(&self) -> Granularity {
        self.granularity
    }

    fn emitted(&self) -> usize {
        self.records.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
