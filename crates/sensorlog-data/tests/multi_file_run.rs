//! Whole-run tests: discovery, decoding, bucketing and export over several
//! files on disk.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use sensorlog_data::core::error::ReportError;
use sensorlog_data::core::models::{Granularity, RunConfig};
use sensorlog_data::export::{export_report, ExportFormat};
use sensorlog_data::pipeline::build_report;
use sensorlog_data::reader::select_log_files;
use tempfile::TempDir;

// ── Helpers ───────────────────────────────────────────────────────────────────

const HEADER_2018: &str = "Logger;ISO-1\nTimestamp;T1;T2;T3;T4;T5;T6;T7;T8;T9;T10;T11;T12;T13;T14;T15;T16;T17;T18;T19;T20;T21;T22;T23;T24;T25;T26;T27;T28;T29;T30;T31;Cable;Element";

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

/// One 34-field data line: timestamp, 31 channels, two flags.
fn line(timestamp: &str, first: &str, second: &str, cable: u8, element: u8) -> String {
    let mut fields = vec![timestamp.to_string(), first.to_string(), second.to_string()];
    fields.extend(std::iter::repeat("0".to_string()).take(29));
    fields.push(cable.to_string());
    fields.push(element.to_string());
    fields.join(";")
}

fn write_log(dir: &Path, name: &str, header: Option<&str>, lines: &[String]) {
    let mut body = String::new();
    if let Some(header) = header {
        body.push_str(header);
        body.push('\n');
    }
    for l in lines {
        body.push_str(l);
        body.push('\n');
    }
    fs::write(dir.join(name), body).unwrap();
}

fn config(from: NaiveDateTime, to: NaiveDateTime, granularity: Granularity) -> RunConfig {
    RunConfig::new(from, to, granularity).with_columns((1..=31).collect(), 34)
}

fn day_config(granularity: Granularity) -> RunConfig {
    config(ts(2018, 2, 14, 0, 0, 0), ts(2018, 2, 14, 23, 59, 59), granularity)
}

/// Three files of one day: a 2018 header, a headerless file and one with a
/// line from the previous day.
fn write_day(dir: &Path) {
    write_log(
        dir,
        "2018.02.14_00_00.csv",
        Some(HEADER_2018),
        &[
            line("2018.02.14_00:00:10", "1,0", "10,0", 0, 0),
            line("2018.02.14_00:00:40", "3,0", "30,0", 1, 0),
            line("2018.02.14_00:59:59", "5,0", "50,0", 0, 0),
        ],
    );
    write_log(
        dir,
        "2018.02.14_01_00.csv",
        None,
        &[
            line("2018.02.14_01:00:00", "2,0", "20,0", 0, 1),
            line("2018.02.14_01:30:00", "4,0", "40,0", 0, 0),
        ],
    );
    write_log(
        dir,
        "2018.02.14_22_00.csv",
        Some(HEADER_2018),
        &[
            line("2018.02.15_00:00:01", "9,0", "90,0", 1, 1),
            line("2018.02.14_22:10:00", "6,0", "60,0", 0, 0),
        ],
    );
}

// ── Pass-through ──────────────────────────────────────────────────────────────

#[test]
fn test_straight_count_equals_in_window_lines() {
    let tmp = TempDir::new().unwrap();
    write_day(tmp.path());

    let cfg = day_config(Granularity::Straight);
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    assert_eq!(files.len(), 3);

    let result = build_report(&files, &cfg).unwrap();
    assert_eq!(result.records.len(), 6);
    assert_eq!(result.metadata.records_decoded, 6);
    assert_eq!(result.metadata.lines_out_of_window, 1);
    assert_eq!(result.metadata.files_without_data_table, 0);
}

// ── Averaging ─────────────────────────────────────────────────────────────────

#[test]
fn test_buckets_increase_across_files() {
    let tmp = TempDir::new().unwrap();
    write_day(tmp.path());

    for granularity in [Granularity::Minutely, Granularity::Hourly, Granularity::Daily] {
        let cfg = day_config(granularity);
        let files = select_log_files(tmp.path(), &cfg).unwrap();
        let result = build_report(&files, &cfg).unwrap();

        let unit = granularity.unit().unwrap();
        for pair in result.records.windows(2) {
            assert!(pair[0].timestamp + unit <= pair[1].timestamp);
        }
    }
}

#[test]
fn test_hourly_means_and_flags() {
    let tmp = TempDir::new().unwrap();
    write_day(tmp.path());

    let cfg = day_config(Granularity::Hourly);
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    let result = build_report(&files, &cfg).unwrap();

    assert_eq!(result.records.len(), 3);

    let first = &result.records[0];
    assert_eq!(first.timestamp, ts(2018, 2, 14, 0, 0, 0));
    assert!((first.values[0] - 3.0).abs() < 1e-6);
    assert!((first.values[1] - 30.0).abs() < 1e-5);
    assert!(first.heating_cable_on);
    assert!(!first.heating_element_on);

    let second = &result.records[1];
    assert_eq!(second.timestamp, ts(2018, 2, 14, 1, 0, 0));
    assert!((second.values[0] - 3.0).abs() < 1e-6);
    assert!(second.heating_element_on);

    let third = &result.records[2];
    assert_eq!(third.timestamp, ts(2018, 2, 14, 22, 0, 0));
    assert_eq!(third.values[0], 6.0);
    assert!(!third.heating_cable_on);
}

#[test]
fn test_gap_reanchoring_across_files() {
    let tmp = TempDir::new().unwrap();
    write_log(
        tmp.path(),
        "2018.02.14_00_00.csv",
        Some(HEADER_2018),
        &[line("2018.02.14_00:00:10", "1,0", "1,0", 0, 0)],
    );
    write_log(
        tmp.path(),
        "2018.02.14_03_15.csv",
        Some(HEADER_2018),
        &[line("2018.02.14_03:15:00", "2,0", "2,0", 0, 0)],
    );

    let cfg = day_config(Granularity::Minutely);
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    let result = build_report(&files, &cfg).unwrap();

    let stamps: Vec<NaiveDateTime> = result.records.iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![ts(2018, 2, 14, 0, 0, 0), ts(2018, 2, 14, 3, 15, 0)]);
    assert_eq!(result.records[0].values[0], 1.0);
    assert_eq!(result.records[1].values[0], 2.0);
}

// ── Window filtering ──────────────────────────────────────────────────────────

#[test]
fn test_out_of_window_record_leaves_bucket_untouched() {
    let tmp = TempDir::new().unwrap();
    write_log(
        tmp.path(),
        "2018.02.14_12_05.csv",
        Some(HEADER_2018),
        &[
            line("2018.02.14_12:05:10", "100,0", "100,0", 1, 1),
            line("2018.02.14_12:05:40", "2,0", "4,0", 0, 0),
            line("2018.02.14_12:05:50", "4,0", "8,0", 0, 0),
        ],
    );

    let cfg = config(
        ts(2018, 2, 14, 12, 5, 30),
        ts(2018, 2, 14, 23, 59, 59),
        Granularity::Minutely,
    );
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    let result = build_report(&files, &cfg).unwrap();

    assert_eq!(result.records.len(), 1);
    let bucket = &result.records[0];
    assert_eq!(bucket.timestamp, ts(2018, 2, 14, 12, 5, 0));
    assert_eq!(bucket.values[0], 3.0);
    assert_eq!(bucket.values[1], 6.0);
    assert!(!bucket.heating_cable_on);
    assert!(!bucket.heating_element_on);
}

#[test]
fn test_nothing_in_window_is_empty_result() {
    let tmp = TempDir::new().unwrap();
    write_log(
        tmp.path(),
        "2018.02.14_23_00.csv",
        Some(HEADER_2018),
        &[line("2018.02.15_01:00:00", "1,0", "1,0", 0, 0)],
    );

    let cfg = day_config(Granularity::Daily);
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    let err = build_report(&files, &cfg).unwrap_err();
    assert!(matches!(err, ReportError::EmptyResult));
}

// ── Silent vs strict ──────────────────────────────────────────────────────────

fn write_corrupted(dir: &Path) {
    write_log(
        dir,
        "2018.02.14_12_00.csv",
        Some(HEADER_2018),
        &[
            line("2018.02.14_12:00:00", "1,0", "1,0", 0, 0),
            "2018.02.14_12:00:01;1,5;x;3".to_string(),
            line("2018.02.14_12:00:02", "3,0", "3,0", 0, 0),
        ],
    );
}

#[test]
fn test_silent_run_skips_malformed_line() {
    let tmp = TempDir::new().unwrap();
    write_corrupted(tmp.path());

    let cfg = day_config(Granularity::Straight);
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    let result = build_report(&files, &cfg).unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.metadata.malformed_lines_skipped, 1);
}

#[test]
fn test_strict_run_fails_without_report() {
    let tmp = TempDir::new().unwrap();
    write_corrupted(tmp.path());
    let output = tmp.path().join("report.csv");

    let cfg = day_config(Granularity::Straight).with_silent(false);
    let files = select_log_files(tmp.path(), &cfg).unwrap();

    let err = build_report(&files, &cfg)
        .and_then(|result| {
            export_report(&result.records, cfg.granularity, &output, ExportFormat::Csv)
        })
        .unwrap_err();

    match err {
        ReportError::LineDecode { line_number, line, .. } => {
            assert_eq!(line_number, 4);
            assert_eq!(line, "2018.02.14_12:00:01;1,5;x;3");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn test_blank_line_in_table_follows_silent_policy() {
    let tmp = TempDir::new().unwrap();
    write_log(
        tmp.path(),
        "2018.02.14_12_00.csv",
        Some(HEADER_2018),
        &[
            line("2018.02.14_12:00:00", "1,0", "1,0", 0, 0),
            String::new(),
            line("2018.02.14_12:00:01", "2,0", "2,0", 0, 0),
        ],
    );

    let silent = day_config(Granularity::Straight);
    let files = select_log_files(tmp.path(), &silent).unwrap();
    let result = build_report(&files, &silent).unwrap();
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.metadata.malformed_lines_skipped, 0);

    let strict = silent.with_silent(false);
    match build_report(&files, &strict).unwrap_err() {
        ReportError::LineDecode { line_number, reason, .. } => {
            assert_eq!(line_number, 4);
            assert_eq!(reason, "blank line");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── End to end ────────────────────────────────────────────────────────────────

#[test]
fn test_end_to_end_minutely_export() {
    let tmp = TempDir::new().unwrap();
    write_log(
        tmp.path(),
        "2018.02.14_12_05.csv",
        Some(HEADER_2018),
        &["2018.02.14_12:05:15;3,5;-2,96;24,00;-25;-24,98;-24,00;-25.4;-25;44;1;2;3;4;5;6;7;8;9;0;-1;-2;-3;-4;-5;-6;-7;-8;-9;-10;10;-11;12;15.55".to_string()],
    );
    write_log(
        tmp.path(),
        "2018.06.02_15_00.csv",
        Some(HEADER_2018),
        &[line("2018.06.02_15:02:07", "7,25", "-0,5", 0, 1)],
    );

    let cfg = config(
        ts(2018, 2, 14, 0, 0, 0),
        ts(2018, 6, 2, 23, 59, 59),
        Granularity::Minutely,
    );
    let files = select_log_files(tmp.path(), &cfg).unwrap();
    assert_eq!(files.len(), 2);

    let result = build_report(&files, &cfg).unwrap();
    assert_eq!(result.records.len(), 2);

    let first = &result.records[0];
    assert_eq!(first.timestamp, ts(2018, 2, 14, 12, 5, 0));
    assert_eq!(first.values[0], 3.5);
    assert_eq!(first.values[1], -2.96);
    assert!(first.heating_cable_on);
    assert!(first.heating_element_on);

    let second = &result.records[1];
    assert_eq!(second.timestamp, ts(2018, 6, 2, 15, 2, 0));
    assert_eq!(second.values[0], 7.25);

    let output = tmp.path().join("report.csv");
    export_report(&result.records, cfg.granularity, &output, ExportFormat::Csv).unwrap();

    let content = fs::read_to_string(&output).unwrap();
    let rows: Vec<&str> = content.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("Timestamp;ch1;ch2;"));
    assert!(rows[0].ends_with(";ch31;heating_cable;heating_element"));
    assert!(rows[1].starts_with("14.02.2018 12:05;3.5;-2.96;24;"));
    assert!(rows[1].ends_with(";1;1"));
    assert!(rows[2].starts_with("02.06.2018 15:02;7.25;-0.5;"));
    assert!(rows[2].ends_with(";0;1"));
}
