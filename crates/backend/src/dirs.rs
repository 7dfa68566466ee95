//! Well-known directories

use std::path::PathBuf;

const APP_NAME: &str = "codehints";

/// Get the default config directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. CODEHINTS_CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CODEHINTS_CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join(APP_NAME);
  }

  dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME)
}

/// Get the default directory for log files
///
/// Respects the following environment variables (in order of precedence):
/// 1. CODEHINTS_DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_log_dir() -> PathBuf {
  let base = if let Ok(dir) = std::env::var("CODEHINTS_DATA_DIR") {
    PathBuf::from(dir)
  } else if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    PathBuf::from(xdg_data).join(APP_NAME)
  } else {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME)
  };
  base.join("logs")
}
