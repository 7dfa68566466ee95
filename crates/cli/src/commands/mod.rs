//! CLI command implementations

mod config;
mod exclusions;
mod probe;

pub use config::cmd_config_show;
pub use exclusions::{cmd_exclusions_clear, cmd_exclusions_list};
pub use probe::{ProbeArgs, ProbeRequest, cmd_probe};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolve the project directory, defaulting to the current directory.
pub(crate) fn project_dir(project: Option<&Path>) -> Result<PathBuf> {
  let dir = match project {
    Some(dir) => dir.to_path_buf(),
    None => std::env::current_dir().context("Failed to read current directory")?,
  };
  dir
    .canonicalize()
    .with_context(|| format!("Project directory {} does not exist", dir.display()))
}
