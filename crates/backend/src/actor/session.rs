//! Host-side state of one worker session.
//!
//! A session is created by a cold activation (or a reset) and lives until a
//! replacement reaches readiness or the project closes. It records which
//! names the worker asked for and where they resolved, and how many files
//! were handed over, so seeding can be bounded.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ipc::WorkerRequest;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
  /// Enumerating the active directory
  Initializing,
  /// INIT sent, waiting for the active file to be primed
  SeedingFiles,
  /// Pushing the previous document's text before re-priming
  Flushing,
  /// Serving requests
  Ready,
}

/// Result of offering a batch of files to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddFiles {
  /// Files that fit under the cap, in the order offered
  pub files: Vec<PathBuf>,
  pub limit_reached: bool,
}

#[derive(Debug)]
pub struct WorkerSession {
  pub id: SessionId,
  pub state: SessionState,
  pub root_dir: PathBuf,
  pub project_root: Option<PathBuf>,
  /// Path of the document whose activation created the session
  pub active_path: PathBuf,
  pub untitled: bool,
  resolved: HashMap<String, PathBuf>,
  initial_files: usize,
  resolved_files: usize,
  added_files: usize,
  stop_adding: bool,
  /// Whether background directory expansion is running
  pub expanding: bool,
  outbox: Vec<WorkerRequest>,
  cancel: CancellationToken,
  seeding: CancellationToken,
}

impl WorkerSession {
  pub fn new(
    id: SessionId,
    root_dir: PathBuf,
    project_root: Option<PathBuf>,
    active_path: PathBuf,
    untitled: bool,
    cancel: CancellationToken,
  ) -> Self {
    let seeding = cancel.child_token();
    Self {
      id,
      state: SessionState::Initializing,
      root_dir,
      project_root,
      active_path,
      untitled,
      resolved: HashMap::new(),
      initial_files: 0,
      resolved_files: 0,
      added_files: 0,
      stop_adding: false,
      expanding: false,
      outbox: Vec::new(),
      cancel,
      seeding,
    }
  }

  /// Record the initial file set handed to the worker.
  pub fn begin_init(&mut self, initial_files: usize) {
    self.initial_files = initial_files;
    self.resolved_files = 0;
    self.added_files = 0;
    self.stop_adding = false;
    self.state = SessionState::SeedingFiles;
  }

  pub fn is_ready(&self) -> bool {
    self.state == SessionState::Ready
  }

  /// Mark the session ready and hand back everything queued while it wasn't.
  pub fn mark_ready(&mut self) -> Vec<WorkerRequest> {
    self.state = SessionState::Ready;
    std::mem::take(&mut self.outbox)
  }

  /// Queue a message until the session is ready.
  pub fn enqueue(&mut self, message: WorkerRequest) {
    self.outbox.push(message);
  }

  pub fn queued(&self) -> usize {
    self.outbox.len()
  }

  /// The worker pulled in more files than the initial seed, so the project
  /// resolves modules on its own.
  pub fn using_modules(&self) -> bool {
    self.initial_files != self.resolved_files
  }

  pub fn record_resolution(&mut self, name: String, path: PathBuf) {
    self.resolved.insert(name, path);
    self.resolved_files += 1;
  }

  pub fn resolved_path(&self, name: &str) -> Option<&Path> {
    self.resolved.get(name).map(PathBuf::as_path)
  }

  /// A file the worker already read can be activated without reseeding.
  pub fn can_skip_init(&self, path: &Path) -> bool {
    self.resolved.keys().any(|name| Path::new(name) == path) || self.resolved.values().any(|p| p == path)
  }

  /// Offer `files` for seeding, bounded by `max_file_count`.
  pub fn add_files(&mut self, files: Vec<PathBuf>, max_file_count: usize) -> AddFiles {
    let used = self.resolved_files + self.added_files;
    if self.stop_adding || used >= max_file_count {
      self.stop_adding = true;
      return AddFiles {
        files: Vec::new(),
        limit_reached: true,
      };
    }

    let available = max_file_count - used;
    let limit_reached = files.len() >= available;
    let files: Vec<PathBuf> = files.into_iter().take(available).collect();
    self.added_files += files.len();
    if limit_reached {
      self.stop_adding = true;
      self.seeding.cancel();
    }
    AddFiles { files, limit_reached }
  }

  pub fn limit_reached(&self) -> bool {
    self.stop_adding
  }

  pub fn counts(&self) -> (usize, usize, usize) {
    (self.initial_files, self.resolved_files, self.added_files)
  }

  /// Token stopping the background directory walk.
  pub fn seeding_token(&self) -> CancellationToken {
    self.seeding.clone()
  }

  /// Tear down host-side state: stop seeding and drop anything queued.
  pub fn retire(self) {
    self.cancel.cancel();
    info!(
      session = self.id,
      root = %self.root_dir.display(),
      dropped = self.outbox.len(),
      "Worker session retired"
    );
  }
}
