//! Exclusion list commands
//!
//! Files whose inference timed out are excluded per project. These commands
//! show or reset that list.

use std::path::Path;

use anyhow::{Context, Result};
use codehints::{exclusions_path, load_exclusions, save_exclusions};

use super::project_dir;

pub async fn cmd_exclusions_list(project: Option<&Path>, json: bool) -> Result<()> {
  let root = project_dir(project)?;
  let entries = load_exclusions(&exclusions_path(&root)).await;

  if json {
    println!("{}", serde_json::to_string_pretty(&entries)?);
    return Ok(());
  }

  if entries.is_empty() {
    println!("No files excluded.");
    return Ok(());
  }
  println!("Excluded files ({})", entries.len());
  for path in &entries {
    println!("  {}", path.display());
  }
  Ok(())
}

pub async fn cmd_exclusions_clear(project: Option<&Path>) -> Result<()> {
  let root = project_dir(project)?;
  let path = exclusions_path(&root);
  let cleared = load_exclusions(&path).await.len();

  save_exclusions(&path, &[])
    .await
    .with_context(|| format!("Failed to write {}", path.display()))?;
  println!("Cleared {cleared} excluded file(s)");
  Ok(())
}
