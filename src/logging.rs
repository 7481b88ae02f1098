//! Logging setup: stderr for the operator, a daily-rolling file for later.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at info, or debug when
/// `verbose`. Returns a guard that must be kept alive so buffered file output
/// is flushed on exit.
pub fn init(verbose: bool) -> Result<WorkerGuard> {
  let log_dir = log_dir();
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let file_appender = tracing_appender::rolling::daily(&log_dir, "assetdash.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let default_level = if verbose { "assetdash=debug" } else { "assetdash=info" };
  let make_filter =
    || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(non_blocking)
    .with_ansi(false)
    .with_target(true)
    .with_filter(make_filter());

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_filter(make_filter());

  tracing_subscriber::registry()
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::debug!(dir = %log_dir.display(), "logging initialized");
  Ok(guard)
}

fn log_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|d| d.join("assetdash").join("logs"))
    .unwrap_or_else(|| PathBuf::from("logs"))
}
