use std::fmt::Write as _;
use std::sync::OnceLock;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use tracing::warn;

use crate::error::{ReportError, Result};

// ── Timestamp patterns ────────────────────────────────────────────────────────

fn pattern_tokens() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        Regex::new(r"yyyy|yy|MM|dd|HH|mm|ss|SSS").expect("regex is valid")
    })
}

/// Translate a logger-style pattern such as `yyyy.MM.dd_HH:mm:ss` into the
/// equivalent chrono strftime pattern (`%Y.%m.%d_%H:%M:%S`).
///
/// Patterns that already contain a `%` are treated as strftime and returned
/// unchanged.
pub fn to_strftime(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    pattern_tokens()
        .replace_all(pattern, |caps: &Captures<'_>| {
            let spec = match &caps[0] {
                "yyyy" => "%Y",
                "yy" => "%y",
                "MM" => "%m",
                "dd" => "%d",
                "HH" => "%H",
                "mm" => "%M",
                "ss" => "%S",
                "SSS" => "%3f",
                other => other,
            };
            spec.to_string()
        })
        .into_owned()
}

/// Number of bytes a timestamp rendered with `pattern` occupies.
///
/// Only meaningful for fixed-width patterns, which is what the logger
/// writes. Fails when `pattern` is not a valid strftime pattern.
pub fn timestamp_width(pattern: &str) -> Result<usize> {
    let reference = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ReportError::Config("invalid reference date".to_string()))?;

    let mut rendered = String::new();
    write!(rendered, "{}", reference.format(pattern))
        .map_err(|_| ReportError::Config(format!("invalid timestamp pattern: {pattern}")))?;
    Ok(rendered.len())
}

/// Parse `s` with a strftime `pattern`, returning `None` on mismatch.
pub fn parse_timestamp(s: &str, pattern: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, pattern).ok()
}

// ── Command-line dates ────────────────────────────────────────────────────────

/// Parse a period bound given on the command line or in persisted settings.
///
/// Accepts `1970-12-31T23:59:59`, `1970-12-31 23:59:59`, `1970-12-31T23:59`
/// and a bare `1970-12-31`. A bare date resolves to the first second of the
/// day, or the last one when `end_of_day` is set.
pub fn parse_datetime_arg(s: &str, end_of_day: bool) -> Result<NaiveDateTime> {
    let s = s.trim();

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let time = if end_of_day { end_of_day_time() } else { NaiveTime::MIN };
        return Ok(date.and_time(time));
    }

    warn!("could not parse date-time argument \"{}\"", s);
    Err(ReportError::TimestampParse(s.to_string()))
}

/// Default reporting window: the whole of today in local time.
pub fn today_period() -> (NaiveDateTime, NaiveDateTime) {
    let today = Local::now().date_naive();
    (today.and_time(NaiveTime::MIN), today.and_time(end_of_day_time()))
}

fn end_of_day_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
