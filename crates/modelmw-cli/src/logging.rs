//! Tracing setup: stderr always, plus an optional per-run log file.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub(crate) fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "mmw_client=debug,modelmw_cli=debug,info",
        _ => "trace",
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit or
/// buffered file output is lost.
pub(crate) fn init(verbose: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = create_run_log_writer(dir)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}

/// Non-blocking writer for `{log_dir}/run-{timestamp}.log`.
pub(crate) fn create_run_log_writer(log_dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)?;

    let file_name = format!("run-{}.log", Utc::now().format("%Y%m%d-%H%M%S"));
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    Ok(tracing_appender::non_blocking(file_appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_directive_by_verbosity() {
        assert_eq!(default_directive(0), "info");
        assert!(default_directive(1).contains("mmw_client=debug"));
        assert_eq!(default_directive(2), "trace");
        assert_eq!(default_directive(7), "trace");
    }

    #[test]
    fn test_run_log_writer_creates_timestamped_file() {
        let tmp = tempfile::tempdir().expect("Failed to create tempdir");
        let log_dir = tmp.path().join("state").join("logs");

        let (writer, guard) = create_run_log_writer(&log_dir).expect("Should create log writer");
        drop(writer);
        drop(guard);

        let entries: Vec<_> = std::fs::read_dir(&log_dir)
            .expect("Should read log dir")
            .collect();
        assert_eq!(entries.len(), 1, "Exactly one log file should be created");

        let name = entries[0]
            .as_ref()
            .expect("Should read entry")
            .file_name()
            .to_string_lossy()
            .to_string();
        let stem = name
            .strip_prefix("run-")
            .and_then(|rest| rest.strip_suffix(".log"))
            .unwrap_or_else(|| panic!("unexpected log file name: {name}"));
        // YYYYMMDD-HHMMSS
        assert_eq!(stem.len(), 15);
        assert_eq!(stem.chars().nth(8), Some('-'));
    }

    #[test]
    fn test_run_log_writer_fails_on_impossible_dir() {
        let bad_path = PathBuf::from("/dev/null/impossible/logs");
        assert!(create_run_log_writer(&bad_path).is_err());
    }
}
