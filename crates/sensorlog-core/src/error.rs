use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while building a sensor report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// A log file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line inside the data table could not be decoded.
    #[error("Failed to decode line {line_number} ({reason}): {line}")]
    LineDecode {
        line_number: u64,
        line: String,
        reason: String,
    },

    /// A timestamp string did not match the expected format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// A granularity name is not one of the recognised report types.
    #[error("Invalid granularity: {0}")]
    InvalidGranularity(String),

    /// The reporting period is empty or reversed.
    #[error("Invalid period: {from} must be before {to}")]
    InvalidPeriod {
        from: NaiveDateTime,
        to: NaiveDateTime,
    },

    /// No log file in the directory matches the selected period.
    #[error("No log files found in {0}")]
    NoLogFiles(PathBuf),

    /// Nothing survived filtering across the whole run.
    #[error("Nothing to export: no records within the selected period")]
    EmptyResult,

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON document could not be read or written.
    #[error("Failed to process JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The CSV writer failed.
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl ReportError {
    /// `true` for the failures a silent run is allowed to skip over.
    pub fn is_line_decode(&self) -> bool {
        matches!(self, ReportError::LineDecode { .. })
    }
}

/// Convenience alias used throughout the sensorlog crates.
pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ReportError::FileRead {
            path: PathBuf::from("/logs/2018.02.14_12_00.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/logs/2018.02.14_12_00.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_line_decode_carries_line() {
        let err = ReportError::LineDecode {
            line_number: 7,
            line: "2018.12.13_18:46:56;abc".to_string(),
            reason: "invalid float in column 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("2018.12.13_18:46:56;abc"));
        assert!(msg.contains("invalid float in column 1"));
        assert!(err.is_line_decode());
    }

    #[test]
    fn test_error_display_timestamp_parse() {
        let err = ReportError::TimestampParse("not-a-timestamp".to_string());
        assert_eq!(err.to_string(), "Invalid timestamp format: not-a-timestamp");
        assert!(!err.is_line_decode());
    }

    #[test]
    fn test_error_display_invalid_granularity() {
        let err = ReportError::InvalidGranularity("weekly".to_string());
        assert_eq!(err.to_string(), "Invalid granularity: weekly");
    }

    #[test]
    fn test_error_display_invalid_period() {
        let day = NaiveDate::from_ymd_opt(2018, 2, 14).unwrap();
        let err = ReportError::InvalidPeriod {
            from: day.and_hms_opt(12, 0, 0).unwrap(),
            to: day.and_hms_opt(8, 0, 0).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid period: 2018-02-14 12:00:00 must be before 2018-02-14 08:00:00"
        );
    }

    #[test]
    fn test_error_display_no_log_files() {
        let err = ReportError::NoLogFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No log files found in /empty/dir");
    }

    #[test]
    fn test_error_display_empty_result() {
        let msg = ReportError::EmptyResult.to_string();
        assert!(msg.starts_with("Nothing to export"));
    }

    #[test]
    fn test_error_display_config() {
        let err = ReportError::Config("column list is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: column list is empty");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ReportError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: ReportError = json_err.into();
        assert!(err.to_string().contains("Failed to process JSON"));
    }
}
