//! Logging setup
//!
//! Logs go to stderr so stdout stays machine-readable, or to a daily rolling
//! file under the data directory.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Get the log directory (respects env vars)
pub fn log_dir() -> PathBuf {
  codehints::dirs::default_log_dir()
}

/// Parse log level from a CLI string
fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::WARN,
  }
}

/// Initialize logging.
///
/// Returns the guard that must be kept alive for the duration of the program
/// when logging to a file.
pub fn init_logging(level: &str, to_file: bool) -> Option<WorkerGuard> {
  // RUST_LOG still overrides the level
  let env_filter = EnvFilter::builder()
    .with_default_directive(parse_log_level(level).into())
    .from_env_lossy();

  if !to_file {
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_writer(std::io::stderr)
      .init();
    return None;
  }

  let dir = log_dir();
  if let Err(e) = std::fs::create_dir_all(&dir) {
    eprintln!("Failed to create log directory {}: {e}, logging to stderr", dir.display());
    return init_logging(level, false);
  }

  let file_appender = tracing_appender::rolling::daily(&dir, "codehints.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .init();

  Some(guard)
}
