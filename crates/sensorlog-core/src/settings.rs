use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Granularity, RunConfig, DEFAULT_EXPECTED_COLUMNS, DEFAULT_VALUE_COLUMNS};
use crate::time_utils::{parse_datetime_arg, timestamp_width, to_strftime, today_period};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Build averaged reports from semicolon-delimited sensor logs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sensorlog",
    about = "Build averaged reports from semicolon-delimited sensor logs",
    version
)]
pub struct Settings {
    /// Start of the reporting period (inclusive), e.g. 2018-12-13T00:00:00
    #[arg(long)]
    pub from: Option<String>,

    /// End of the reporting period (inclusive); a bare date means end of day
    #[arg(long)]
    pub to: Option<String>,

    /// Report granularity
    #[arg(long, default_value = "daily", value_parser = ["straight", "minutely", "hourly", "daily"])]
    pub granularity: String,

    /// Directory holding the log files
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Report file to write
    #[arg(long, default_value = "report.csv")]
    pub output: PathBuf,

    /// Report file format
    #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
    pub format: String,

    /// Abort on the first malformed data line instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Field separator used by the logger
    #[arg(long, default_value = ";")]
    pub field_separator: char,

    /// Decimal separator used by the logger
    #[arg(long, default_value = ",")]
    pub decimal_separator: char,

    /// Timestamp pattern of the first column (yyyy/MM/dd/HH/mm/ss tokens or strftime)
    #[arg(long, default_value = "yyyy.MM.dd_HH:mm:ss")]
    pub timestamp_pattern: String,

    /// Comma-separated raw column indices to read as channels
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<usize>,

    /// Minimum number of fields in a data line
    #[arg(long, default_value_t = DEFAULT_EXPECTED_COLUMNS)]
    pub expected_columns: usize,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.sensorlog/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_separator: Option<char>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.sensorlog/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".sensorlog").join("last_used.json")
    }

    /// Load persisted params from the default path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load persisted params from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable settings file {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and merge them with last-used params where no
    /// explicit CLI value was provided, then persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!("could not clear {}: {}", config_path.display(), e);
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; clap stores arg ids under the field name.
        if !is_arg_explicitly_set(&matches, "granularity") {
            if let Some(v) = last.granularity {
                settings.granularity = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "from") && settings.from.is_none() {
            settings.from = last.from;
        }
        if !is_arg_explicitly_set(&matches, "to") && settings.to.is_none() {
            settings.to = last.to;
        }
        if !is_arg_explicitly_set(&matches, "logs_dir") && settings.logs_dir.is_none() {
            settings.logs_dir = last.logs_dir;
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "decimal_separator") {
            if let Some(v) = last.decimal_separator {
                settings.decimal_separator = v;
            }
        }

        settings = Self::apply_debug(settings);

        let params = LastUsedParams::from(&settings);
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!("could not persist settings to {}: {}", config_path.display(), e);
        }

        settings
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        settings.log_level = settings.effective_log_level().to_string();
        settings
    }

    /// Log level after `--debug` is taken into account.
    ///
    /// Logging options are never persisted, so a plain CLI parse is enough to
    /// install the subscriber before [`Settings::load_with_last_used`] runs.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Validate the settings and turn them into the read-only [`RunConfig`]
    /// shared by the decoder and the report builder.
    pub fn run_config(&self) -> Result<RunConfig> {
        let (today_start, today_end) = today_period();
        let date_from = match &self.from {
            Some(s) => parse_datetime_arg(s, false)?,
            None => today_start,
        };
        let date_to = match &self.to {
            Some(s) => parse_datetime_arg(s, true)?,
            None => today_end,
        };

        let granularity: Granularity = self.granularity.parse()?;

        let pattern = to_strftime(&self.timestamp_pattern);
        timestamp_width(&pattern)?;

        let columns = if self.columns.is_empty() {
            DEFAULT_VALUE_COLUMNS.to_vec()
        } else {
            self.columns.clone()
        };

        let config = RunConfig::new(date_from, date_to, granularity)
            .with_silent(!self.strict)
            .with_separators(self.field_separator, self.decimal_separator)
            .with_timestamp_pattern(pattern)
            .with_columns(columns, self.expected_columns);
        config.validate()?;
        Ok(config)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            granularity: Some(s.granularity.clone()),
            from: s.from.clone(),
            to: s.to.clone(),
            logs_dir: s.logs_dir.clone(),
            format: Some(s.format.clone()),
            decimal_separator: Some(s.decimal_separator),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
