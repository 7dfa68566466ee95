//! Test helpers for actor integration tests.
//!
//! Provides `ScopeTestContext`, which spawns a [`ScopeActor`] against an
//! in-memory filesystem and a scripted worker. The test drives the worker side
//! by reading what the actor sent and emitting events back.

use std::{
  collections::{BTreeMap, BTreeSet, HashSet},
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
  actor::{
    coordinator::{ScopeActor, ScopeOptions},
    handle::ScopeHandle,
    session::SessionId,
  },
  domain::document::DocumentSnapshot,
  fs::{DirEntry, FileSystem, FsError},
  ipc::{WorkerEvent, WorkerRequest, wire_path},
  worker::{WorkerChannel, WorkerConnection, WorkerError},
};

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// In-memory filesystem
// ============================================================================

#[derive(Debug, Default)]
pub struct FakeFs {
  files: Mutex<BTreeMap<PathBuf, String>>,
  dirs: Mutex<BTreeSet<PathBuf>>,
  failing: Mutex<HashSet<PathBuf>>,
}

impl FakeFs {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Add a file, creating its ancestor directories.
  pub fn add_file(&self, path: impl AsRef<Path>, text: &str) {
    let path = path.as_ref();
    let mut dirs = self.dirs.lock().unwrap();
    for ancestor in path.ancestors().skip(1) {
      dirs.insert(ancestor.to_path_buf());
    }
    self.files.lock().unwrap().insert(path.to_path_buf(), text.to_string());
  }

  pub fn text(&self, path: impl AsRef<Path>) -> Option<String> {
    self.files.lock().unwrap().get(path.as_ref()).cloned()
  }

  /// Make listing `dir` fail with an IO error.
  pub fn fail_listing(&self, dir: impl AsRef<Path>) {
    self.failing.lock().unwrap().insert(dir.as_ref().to_path_buf());
  }
}

#[async_trait]
impl FileSystem for FakeFs {
  async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError> {
    if self.failing.lock().unwrap().contains(dir) {
      return Err(FsError::Io {
        path: dir.to_path_buf(),
        message: "permission denied".to_string(),
      });
    }
    if !self.dirs.lock().unwrap().contains(dir) {
      return Err(FsError::NotFound(dir.to_path_buf()));
    }

    let mut entries: Vec<DirEntry> = self
      .files
      .lock()
      .unwrap()
      .keys()
      .filter(|p| p.parent() == Some(dir))
      .map(DirEntry::file)
      .collect();
    entries.extend(
      self
        .dirs
        .lock()
        .unwrap()
        .iter()
        .filter(|p| p.parent() == Some(dir))
        .map(DirEntry::dir),
    );
    entries.sort();
    Ok(entries)
  }

  async fn read_text(&self, path: &Path) -> Result<String, FsError> {
    self.text(path).ok_or_else(|| FsError::NotFound(path.to_path_buf()))
  }

  async fn find_files_named(&self, root: &Path, file_name: &str) -> Result<Vec<PathBuf>, FsError> {
    Ok(
      self
        .files
        .lock()
        .unwrap()
        .keys()
        .filter(|p| p.starts_with(root) && p.file_name().is_some_and(|n| n == file_name))
        .cloned()
        .collect(),
    )
  }
}

// ============================================================================
// Scripted worker
// ============================================================================

/// Worker side handed to the actor. Records everything sent and answers
/// SET_CONFIG / RESET with WORKER_READY on its own.
struct FakeWorker {
  sent: mpsc::UnboundedSender<WorkerRequest>,
  events: mpsc::Sender<WorkerEvent>,
}

impl WorkerChannel for FakeWorker {
  fn send(&self, message: WorkerRequest) -> Result<(), WorkerError> {
    let restarts = matches!(message, WorkerRequest::SetConfig { .. } | WorkerRequest::Reset);
    self.sent.send(message).map_err(|_| WorkerError::Closed)?;
    if restarts {
      self
        .events
        .try_send(WorkerEvent::WorkerReady)
        .map_err(|_| WorkerError::Closed)?;
    }
    Ok(())
  }
}

/// Test side of the scripted worker.
pub struct WorkerProbe {
  sent: mpsc::UnboundedReceiver<WorkerRequest>,
  events: mpsc::Sender<WorkerEvent>,
}

impl WorkerProbe {
  /// Next message the actor sent.
  pub async fn next(&mut self) -> WorkerRequest {
    tokio::time::timeout(WAIT, self.sent.recv())
      .await
      .expect("timed out waiting for a worker message")
      .expect("worker channel closed")
  }

  /// Skip messages until one matches.
  pub async fn expect(&mut self, mut matches: impl FnMut(&WorkerRequest) -> bool) -> WorkerRequest {
    loop {
      let message = self.next().await;
      if matches(&message) {
        return message;
      }
    }
  }

  /// Names of the next `n` messages.
  pub async fn next_names(&mut self, n: usize) -> Vec<&'static str> {
    let mut names = Vec::with_capacity(n);
    for _ in 0..n {
      names.push(self.next().await.name());
    }
    names
  }

  /// Assert nothing else is sent for a short while.
  pub async fn assert_quiet(&mut self) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(message) = self.sent.try_recv() {
      panic!("unexpected worker message: {message:?}");
    }
  }

  pub async fn emit(&self, event: WorkerEvent) {
    self.events.send(event).await.expect("actor stopped listening to the worker");
  }

  pub async fn primed(&self, path: &Path) {
    self
      .emit(WorkerEvent::PrimePump {
        path: wire_path(path),
      })
      .await;
  }
}

// ============================================================================
// Test context
// ============================================================================

pub struct ScopeTestContext {
  /// Real directory holding the project's preference files
  pub project: TempDir,
  pub fs: Arc<FakeFs>,
  pub worker: WorkerProbe,
  pub handle: ScopeHandle,
  pub cancel: CancellationToken,
}

impl ScopeTestContext {
  pub async fn new() -> Self {
    Self::with_config("").await
  }

  /// Context whose project carries `config_toml` as its config file.
  pub async fn with_config(config_toml: &str) -> Self {
    let project = TempDir::new().expect("create project temp dir");
    let config_dir = project.path().join(".codehints");
    std::fs::create_dir_all(&config_dir).expect("create config dir");
    std::fs::write(config_dir.join("config.toml"), config_toml).expect("write config");

    let fs = FakeFs::new();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(64);
    let worker = FakeWorker {
      sent: sent_tx,
      events: events_tx.clone(),
    };
    let connection = WorkerConnection::new(Arc::new(worker), events_rx);

    let cancel = CancellationToken::new();
    let handle = ScopeActor::spawn(connection, fs.clone(), ScopeOptions::default(), cancel.clone());

    Self {
      project,
      fs,
      worker: WorkerProbe {
        sent: sent_rx,
        events: events_tx,
      },
      handle,
      cancel,
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.project.path().join(relative)
  }

  pub fn wire(&self, relative: &str) -> String {
    wire_path(&self.path(relative))
  }

  pub fn add_file(&self, relative: &str, text: &str) {
    self.fs.add_file(self.path(relative), text);
  }

  /// Snapshot of a file previously added with [`Self::add_file`].
  pub fn doc(&self, relative: &str) -> DocumentSnapshot {
    let path = self.path(relative);
    let text = self.fs.text(&path).unwrap_or_default();
    DocumentSnapshot::new(path, text)
  }

  pub async fn open_project(&self) {
    self.handle.on_project_opened(self.project.path()).await.expect("open project");
  }

  /// Open the project, activate `relative` and answer the handshake without
  /// serving any file, so the session skips directory expansion.
  pub async fn start_session(&mut self, relative: &str) -> SessionId {
    self.open_project().await;
    let doc = self.doc(relative);
    self.handle.on_active_editor_changed(doc.clone(), None).await.expect("activate");

    self.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;
    self.worker.primed(&doc.path).await;
    self.wait_ready().await
  }

  pub async fn wait_ready(&self) -> SessionId {
    tokio::time::timeout(WAIT, self.handle.when_ready())
      .await
      .expect("timed out waiting for the session")
      .expect("actor gone")
  }
}

impl Drop for ScopeTestContext {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if check().await {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  false
}
