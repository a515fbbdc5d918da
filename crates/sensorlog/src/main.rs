mod bootstrap;

use anyhow::Result;
use clap::Parser;
use sensorlog_core::error::ReportError;
use sensorlog_core::settings::Settings;
use sensorlog_data::export::{export_report, remove_stale_report, ExportFormat};
use sensorlog_data::pipeline::build_report;
use sensorlog_data::reader::select_log_files;

fn main() -> Result<()> {
    // Logging comes from the command line alone, so it is installed before the
    // persisted parameters are read and their warnings have somewhere to go.
    let cli = Settings::parse();
    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(cli.effective_log_level(), cli.log_file.as_ref())?;

    tracing::info!("sensorlog v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load_with_last_used();

    let config = settings.run_config()?;
    let format: ExportFormat = settings.format.parse()?;
    let logs_dir = settings
        .logs_dir
        .clone()
        .or_else(bootstrap::discover_logs_dir)
        .ok_or_else(|| ReportError::Config("no logs directory given (use --logs-dir)".to_string()))?;

    tracing::info!(
        "Period {} .. {}, {}, mode: {}",
        config.date_from,
        config.date_to,
        config.granularity.description(),
        if config.silent { "silent" } else { "strict" }
    );

    // A failed run must not leave the previous report behind.
    remove_stale_report(&settings.output)?;

    let files = select_log_files(&logs_dir, &config)?;
    tracing::info!("Found {} log files in {}", files.len(), logs_dir.display());

    let report = build_report(&files, &config)?;
    export_report(&report.records, config.granularity, &settings.output, format)?;

    let meta = &report.metadata;
    tracing::info!(
        "Report written to {}: {} records from {} files ({} lines read, {} out of period, {} malformed skipped)",
        settings.output.display(),
        meta.records_emitted,
        meta.files_processed,
        meta.lines_read,
        meta.lines_out_of_window,
        meta.malformed_lines_skipped
    );

    Ok(())
}
