use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;

const LOG_PREFIX: &str = "timecache";

/// Install the global subscriber, writing to a daily rolling file under
/// `data_dir/logs` so stdout stays free for command output.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks debug over info.
/// The returned guard must be held until exit or buffered lines are lost.
pub fn init(data_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  let appender = tracing_appender::rolling::Builder::new()
    .rotation(Rotation::DAILY)
    .max_log_files(5)
    .filename_prefix(LOG_PREFIX)
    .build(data_dir.join("logs"))
    .map_err(|e| eyre!("Failed to create log file appender: {}", e))?;
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), level)));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
