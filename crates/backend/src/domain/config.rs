//! Configuration for the code-hint core with per-project overrides.
//!
//! Config priority: project-relative (.codehints/config.toml) > user (~/.config/codehints/config.toml) > defaults
//!
//! A malformed or unreadable file never fails a load: it is logged and the next
//! source is tried.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Errors raised while interpreting configuration values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Invalid {field} pattern: {source}")]
  Pattern {
    field: &'static str,
    #[source]
    source: regex::Error,
  },
  #[error("Failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Exclusion Configuration
// ============================================================================

/// Patterns excluding directories and files from seeding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionsConfig {
  /// Regex matched against each project-relative directory component
  pub directories: String,
  /// Regex matched against the bare file name
  pub files: String,
}

impl Default for ExclusionsConfig {
  fn default() -> Self {
    Self {
      directories: r"^(node_modules|bower_components|\.git)$".to_string(),
      files: r"^(require|jquery)[^/]*\.js$".to_string(),
    }
  }
}

impl ExclusionsConfig {
  /// Compile both patterns. An invalid pattern falls back to the default one.
  pub fn compile(&self) -> ExclusionPatterns {
    let defaults = ExclusionsConfig::default();
    let directories = compile_or_default("directories", &self.directories, &defaults.directories);
    let files = compile_or_default("files", &self.files, &defaults.files);
    ExclusionPatterns { directories, files }
  }
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Option<Regex>, ConfigError> {
  if pattern.is_empty() {
    return Ok(None);
  }
  Regex::new(pattern)
    .map(Some)
    .map_err(|source| ConfigError::Pattern { field, source })
}

fn compile_or_default(field: &'static str, pattern: &str, default: &str) -> Option<Regex> {
  match compile_pattern(field, pattern) {
    Ok(regex) => regex,
    Err(e) => {
      warn!(error = %e, "Falling back to default exclusion pattern");
      compile_pattern(field, default).ok().flatten()
    }
  }
}

/// Compiled form of [`ExclusionsConfig`]
#[derive(Debug, Clone, Default)]
pub struct ExclusionPatterns {
  directories: Option<Regex>,
  files: Option<Regex>,
}

impl ExclusionPatterns {
  /// True if any component of `relative` matches the directory pattern.
  pub fn excludes_directory(&self, relative: &Path) -> bool {
    let Some(re) = &self.directories else {
      return false;
    };
    relative
      .components()
      .any(|c| re.is_match(&c.as_os_str().to_string_lossy()))
  }

  pub fn excludes_file_name(&self, name: &str) -> bool {
    self.files.as_ref().is_some_and(|re| re.is_match(name))
  }
}

// ============================================================================
// Limits Configuration
// ============================================================================

/// Size and count limits applied to what the worker is given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
  /// Texts longer than this (bytes) are sent as empty content (default: 512KB)
  pub max_file_size: usize,
  /// Maximum number of files seeded into one session (default: 100)
  pub max_file_count: usize,
  /// Per-file inference timeout handed to the worker (default: 30000)
  pub inference_timeout_ms: u64,
}

impl Default for LimitsConfig {
  fn default() -> Self {
    Self {
      max_file_size: 512 * 1024,
      max_file_count: 100,
      inference_timeout_ms: 30_000,
    }
  }
}

// ============================================================================
// Sync Configuration
// ============================================================================

/// Thresholds for partial buffer synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Buffers with more lines than this are candidates for fragment syncs (default: 10000)
  pub large_line_count: usize,
  /// Change spans at or above this many lines always sync in full (default: 100)
  pub large_line_change: u32,
  /// Lines scanned in each direction when looking for fragment boundaries (default: 100)
  pub fragment_window: usize,
  /// Column width of a tab when measuring indentation (default: 4)
  pub tab_size: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      large_line_count: 10_000,
      large_line_change: 100,
      fragment_window: 100,
      tab_size: 4,
    }
  }
}

// ============================================================================
// Lifecycle Configuration
// ============================================================================

/// Session reset policy and debug switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
  /// Completion requests served before the worker session is rebuilt (default: 30)
  pub max_hints_before_reset: u32,
  /// Disable threshold-based resets entirely
  pub no_reset: bool,
  /// Log every outbound worker message
  pub debug: bool,
  /// Reset on the next completion request regardless of the threshold (tests only)
  pub force_reset: bool,
}

impl Default for LifecycleConfig {
  fn default() -> Self {
    Self {
      max_hints_before_reset: 30,
      no_reset: false,
      debug: false,
      force_reset: false,
    }
  }
}

// ============================================================================
// Language Configuration
// ============================================================================

/// Which files count as analyzable scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
  /// File extensions (without the dot) of the analyzed language
  pub extensions: Vec<String>,
}

impl Default for LanguageConfig {
  fn default() -> Self {
    Self {
      extensions: ["js", "mjs", "cjs", "jsx"].iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl LanguageConfig {
  pub fn matches(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
  }
}

// ============================================================================
// Top-level Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub exclusions: ExclusionsConfig,
  pub limits: LimitsConfig,
  pub sync: SyncConfig,
  pub lifecycle: LifecycleConfig,
  pub language: LanguageConfig,
}

impl Config {
  /// Load configuration for a project root.
  ///
  /// Tries the project file, then the user file, then falls back to defaults.
  pub async fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if let Some(config) = Self::load_file(&project_config).await {
      return config;
    }

    if let Some(user_config) = Self::user_config_path()
      && let Some(config) = Self::load_file(&user_config).await
    {
      return config;
    }

    Self::default()
  }

  async fn load_file(path: &Path) -> Option<Self> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match Self::parse(path, &content) {
      Ok(config) => {
        debug!(path = %path.display(), "Loaded config");
        Some(config)
      }
      Err(e) => {
        warn!(error = %e, "Ignoring malformed config");
        None
      }
    }
  }

  fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    Some(crate::dirs::default_config_dir().join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".codehints").join("config.toml")
  }
}
