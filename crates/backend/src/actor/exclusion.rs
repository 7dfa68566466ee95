//! Exclusion & timeout policy.
//!
//! Files whose inference timed out in the worker are remembered per project
//! and kept away from the worker from then on. The list only grows, and the
//! file open in the active editor is never added to it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Informational notices surfaced to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeNotice {
  /// A file timed out during inference and will no longer be analyzed
  FileExcluded { path: PathBuf },
}

/// Outcome of a worker-reported inference timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutOutcome {
  /// The file is open in the active editor; nothing changes
  ActiveDocument,
  AlreadyExcluded,
  /// Newly excluded
  Excluded(PathBuf),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExclusionFile {
  #[serde(default)]
  detected_exclusions: Vec<PathBuf>,
}

/// Where a project's detected exclusions are stored.
pub fn exclusions_path(project_root: &Path) -> PathBuf {
  project_root.join(".codehints").join("exclusions.json")
}

/// Read a stored exclusion list. Missing or malformed files yield an empty list.
pub async fn load_exclusions(path: &Path) -> Vec<PathBuf> {
  let content = match tokio::fs::read_to_string(path).await {
    Ok(content) => content,
    Err(_) => return Vec::new(),
  };
  match serde_json::from_str::<ExclusionFile>(&content) {
    Ok(file) => file.detected_exclusions,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "Ignoring malformed exclusion list");
      Vec::new()
    }
  }
}

/// Write an exclusion list, creating the parent directory if needed.
pub async fn save_exclusions(path: &Path, entries: &[PathBuf]) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let file = ExclusionFile {
    detected_exclusions: entries.to_vec(),
  };
  let json = serde_json::to_string_pretty(&file).map_err(std::io::Error::other)?;
  tokio::fs::write(path, json).await
}

async fn persist_task(path: PathBuf, mut rx: watch::Receiver<Vec<PathBuf>>) {
  while rx.changed().await.is_ok() {
    let entries = rx.borrow_and_update().clone();
    match save_exclusions(&path, &entries).await {
      Ok(()) => debug!(path = %path.display(), count = entries.len(), "Saved exclusion list"),
      Err(e) => warn!(path = %path.display(), error = %e, "Failed to save exclusion list"),
    }
  }
}

/// Append-only set of excluded file paths.
#[derive(Debug, Default)]
pub struct ExclusionList {
  entries: Vec<PathBuf>,
  persist: Option<watch::Sender<Vec<PathBuf>>>,
}

impl ExclusionList {
  /// A list backed by `path`. Every insertion is written out in the background,
  /// latest state wins.
  pub fn persisted(path: PathBuf, entries: Vec<PathBuf>) -> Self {
    let (tx, rx) = watch::channel(entries.clone());
    tokio::spawn(persist_task(path, rx));
    Self {
      entries,
      persist: Some(tx),
    }
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.entries.iter().any(|p| p == path)
  }

  pub fn entries(&self) -> &[PathBuf] {
    &self.entries
  }

  /// Add `path`. Returns false if it was already present.
  pub fn insert(&mut self, path: PathBuf) -> bool {
    if self.contains(&path) {
      return false;
    }
    self.entries.push(path);
    if let Some(tx) = &self.persist {
      tx.send_replace(self.entries.clone());
    }
    true
  }

  /// Apply the timeout policy for `file`.
  pub fn on_timeout(&mut self, file: &Path, active: Option<&Path>) -> TimeoutOutcome {
    if active == Some(file) {
      debug!(path = %file.display(), "Inference timed out in the active document, not excluding");
      return TimeoutOutcome::ActiveDocument;
    }
    if !self.insert(file.to_path_buf()) {
      debug!(path = %file.display(), "Excluded file timed out again");
      return TimeoutOutcome::AlreadyExcluded;
    }
    info!(path = %file.display(), "Excluding file after inference timeout");
    TimeoutOutcome::Excluded(file.to_path_buf())
  }
}
