//! Shared types for sensorlog.
//!
//! Holds the record and run-configuration model, the error type, the
//! timestamp helpers and the command-line settings used by every other
//! crate in the workspace.

pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{ReportError, Result};
pub use models::{Granularity, Record, RunConfig};
