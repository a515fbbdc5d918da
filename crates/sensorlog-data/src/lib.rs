//! Ingestion layer for sensorlog.
//!
//! Discovers logger files, decodes their data tables into records, folds the
//! records into time buckets and exports the finished report.

pub mod aggregator;
pub mod decoder;
pub mod export;
pub mod pipeline;
pub mod reader;

pub use sensorlog_core as core;
