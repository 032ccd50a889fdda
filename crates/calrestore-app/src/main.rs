use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use calrestore_core::config::{Settings, load_config};
use calrestore_restore::{BatchingSession, MemorySink, Report, RestoreOptions, restore};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Reads a calendar dump, rebuilds every record it holds and reports what
/// was restored, repaired or rejected.
#[derive(Debug, Parser)]
#[command(name = "calrestore", version, about)]
struct Args {
    /// Dump file to restore.
    dump: PathBuf,

    /// Configuration file. `calrestore.toml` is read when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop at the first entity that fails to restore.
    #[arg(long)]
    fail_on_error: bool,

    /// Restore the private timezones of old dumps instead of dropping them.
    #[arg(long)]
    keep_private_timezones: bool,

    /// Entities per transaction. Overrides the configured value.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,
}

impl Args {
    fn options(&self, settings: &Settings) -> RestoreOptions {
        let mut options = RestoreOptions::from(settings);
        options.fail_on_error |= self.fail_on_error;
        if self.keep_private_timezones {
            options.eliminate_private_timezones = false;
        }
        options
    }
}

fn print_report(report: &Report, format: ReportFormat) -> anyhow::Result<()> {
    match format {
        ReportFormat::Text => println!("{report}"),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    let settings = load_config(args.config.as_deref())?;
    tracing::debug!(config = ?settings, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(settings.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %settings.logging.level, "Invalid log level in config, keeping info");
    }

    let options = args.options(&settings);
    let batch_size = args.batch_size.unwrap_or(settings.restore.batch_size);
    let file = File::open(&args.dump)
        .with_context(|| format!("Failed to open dump {}", args.dump.display()))?;

    tracing::info!(dump = %args.dump.display(), batch_size, "Starting restore");
    let mut sink = BatchingSession::new(MemorySink::new(), batch_size);

    match restore(BufReader::new(file), &mut sink, options) {
        Ok(report) => {
            tracing::info!(
                events = sink.inner().events().len(),
                commits = sink.commits(),
                "Restore finished"
            );
            print_report(&report, args.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            tracing::error!(error = %failure.error, "Restore failed");
            print_report(&failure.report, args.format)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn flags_override_settings() {
        let settings = Settings::from_toml_str("").unwrap();
        let args = Args::parse_from([
            "calrestore",
            "dump.xml",
            "--fail-on-error",
            "--keep-private-timezones",
            "--format",
            "json",
        ]);

        let options = args.options(&settings);
        assert!(options.fail_on_error);
        assert!(!options.eliminate_private_timezones);
        assert_eq!(args.format, ReportFormat::Json);
    }

    #[test_log::test]
    fn settings_apply_without_flags() {
        let settings = Settings::from_toml_str("[restore]\nfail_on_error = true\n").unwrap();
        let args = Args::parse_from(["calrestore", "dump.xml"]);

        let options = args.options(&settings);
        assert!(options.fail_on_error);
        assert!(options.eliminate_private_timezones);
        assert_eq!(args.format, ReportFormat::Text);
    }
}
