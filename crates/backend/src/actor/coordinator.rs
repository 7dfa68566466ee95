//! ScopeActor - owns every piece of worker-facing state
//!
//! The actor is the only place that talks to the worker. It serializes:
//! - Editor activations, gated on preferences and on the current session
//! - Worker readiness (SET_CONFIG / RESET handshakes and the backlog behind them)
//! - Request correlation and coalescing
//! - Hint-count driven resets, single-flight
//! - Seeding, file resolution and timeout exclusions
//!
//! Anything that has to wait (directory listings, file reads, worker replies the
//! actor itself cares about) runs in a spawned task that posts a [`ScopeEvent`]
//! back, so the loop never blocks.

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  changes::ChangeTracker,
  correlator::{Correlator, PendingReply, RequestError, RequestKey},
  exclusion::{ExclusionList, ScopeNotice, TimeoutOutcome, exclusions_path, load_exclusions},
  handle::ScopeHandle,
  message::{HintRequest, ResetReply, ScopeEvent, ScopeMessage, ScopeStatus, SessionStatus},
  resolver::{ResolveRequest, resolve_file},
  seeding::{SeedFilter, SeedPhase, SeedWalk},
  session::{SessionId, SessionState, WorkerSession},
  sync::SyncEngine,
};
use crate::{
  domain::{
    config::{Config, ExclusionPatterns},
    document::{DocumentSnapshot, Offset},
  },
  fs::{DirEntry, FileSystem, FsError},
  ipc::{RequestKind, WorkerEvent, WorkerReply, WorkerRequest, wire_path},
  worker::{WorkerChannel, WorkerConnection},
};

const MESSAGE_BUFFER: usize = 256;
const NOTICE_BUFFER: usize = 16;

/// Requests tied to one worker state rather than to a caller
const SESSION_KINDS: &[RequestKind] = &[RequestKind::PrimePump, RequestKind::UpdateFile];

/// Startup options for a [`ScopeActor`].
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
  /// Used until a project is opened and its preferences are loaded
  pub config: Config,
  /// Type definitions handed to the worker with every INIT
  pub environment: Vec<Value>,
  /// Sent as SET_CONFIG the first time the worker is started
  pub worker_config: Value,
}

/// Which slot a new session goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
  Current,
  /// Replacement built during a reset; swapped in once primed
  Warming,
}

pub struct ScopeActor {
  config: Config,
  patterns: ExclusionPatterns,
  environment: Vec<Value>,
  worker_config: Value,
  fs: Arc<dyn FileSystem>,

  worker: Arc<dyn WorkerChannel>,
  worker_events: mpsc::Receiver<WorkerEvent>,
  worker_started: bool,
  worker_ready: bool,
  /// Messages held while the worker is between a (re)start and WORKER_READY
  backlog: Vec<WorkerRequest>,

  correlator: Correlator,
  changes: ChangeTracker,
  exclusions: ExclusionList,

  project_root: Option<PathBuf>,
  prefs_generation: u64,
  prefs_ready: bool,

  active: Option<DocumentSnapshot>,
  buffer_dirty: bool,
  activations: VecDeque<(DocumentSnapshot, Option<DocumentSnapshot>)>,

  current: Option<WorkerSession>,
  warming: Option<WorkerSession>,
  next_session: SessionId,
  sessions_created: u64,

  hint_count: u32,
  resetting: bool,
  reset_waiters: Vec<oneshot::Sender<ResetReply>>,
  ready_waiters: Vec<oneshot::Sender<SessionId>>,
  close_pending: bool,

  notices: broadcast::Sender<ScopeNotice>,
  rx: mpsc::Receiver<ScopeMessage>,
  events_tx: mpsc::Sender<ScopeEvent>,
  events_rx: mpsc::Receiver<ScopeEvent>,
  cancel: CancellationToken,
}

impl ScopeActor {
  /// Spawn the actor and return a handle to it.
  pub fn spawn(
    connection: WorkerConnection,
    fs: Arc<dyn FileSystem>,
    options: ScopeOptions,
    cancel: CancellationToken,
  ) -> ScopeHandle {
    let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
    let (events_tx, events_rx) = mpsc::channel(MESSAGE_BUFFER);
    let (notices, _) = broadcast::channel(NOTICE_BUFFER);

    let actor = Self {
      patterns: options.config.exclusions.compile(),
      config: options.config,
      environment: options.environment,
      worker_config: options.worker_config,
      fs,
      worker: connection.channel,
      worker_events: connection.events,
      worker_started: false,
      worker_ready: false,
      backlog: Vec::new(),
      correlator: Correlator::new(),
      changes: ChangeTracker::new(),
      exclusions: ExclusionList::default(),
      project_root: None,
      prefs_generation: 0,
      prefs_ready: true,
      active: None,
      buffer_dirty: false,
      activations: VecDeque::new(),
      current: None,
      warming: None,
      next_session: 1,
      sessions_created: 0,
      hint_count: 0,
      resetting: false,
      reset_waiters: Vec::new(),
      ready_waiters: Vec::new(),
      close_pending: false,
      notices: notices.clone(),
      rx,
      events_tx,
      events_rx,
      cancel,
    };

    tokio::spawn(actor.run());
    ScopeHandle::new(tx, notices)
  }

  pub async fn run(mut self) {
    info!("ScopeActor starting");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("ScopeActor received shutdown signal");
          break;
        }

        event = self.worker_events.recv() => {
          match event {
            Some(event) => self.handle_worker_event(event),
            None => {
              warn!("Worker event stream closed, shutting down");
              break;
            }
          }
        }

        Some(event) = self.events_rx.recv() => {
          self.handle_event(event);
        }

        msg = self.rx.recv() => {
          match msg {
            Some(ScopeMessage::Shutdown) | None => {
              info!("ScopeActor shutting down");
              break;
            }
            Some(msg) => self.handle_message(msg),
          }
        }
      }
    }

    self.cleanup();
    info!("ScopeActor stopped");
  }

  fn cleanup(&mut self) {
    let pending = self.correlator.len();
    self.correlator.drain(RequestError::Cancelled);
    for waiter in self.reset_waiters.drain(..) {
      let _ = waiter.send(Err(RequestError::Cancelled));
    }
    if let Some(session) = self.warming.take() {
      session.retire();
    }
    if let Some(session) = self.current.take() {
      session.retire();
    }
    debug!(pending, "Dropped pending requests");
  }

  // ==========================================================================
  // Handle messages
  // ==========================================================================

  fn handle_message(&mut self, msg: ScopeMessage) {
    match msg {
      ScopeMessage::EditorActivated { document, previous } => self.on_editor_activated(document, previous),
      ScopeMessage::BufferEdited { changes } => {
        self.buffer_dirty = true;
        self.changes.track(&changes);
        trace!(pending = ?self.changes.pending(), "Tracked buffer edits");
      }
      ScopeMessage::ProjectOpened { root } => self.on_project_opened(root),
      ScopeMessage::ProjectClosed => self.on_project_closed(),
      ScopeMessage::DirtyFlagChanged { path, dirty } => {
        self.post(WorkerRequest::UpdateDirtyFile {
          name: wire_path(&path),
          action: dirty,
        });
      }
      ScopeMessage::SetWorkerConfig { config } => {
        self.worker_config = config.clone();
        self.post(WorkerRequest::SetConfig { config });
      }
      ScopeMessage::Request {
        request,
        document,
        cursor,
        reply,
      } => {
        let pending = self.handle_request(request, document, cursor);
        let _ = reply.send(pending);
      }
      ScopeMessage::Reset { document, force, reply } => {
        if self.current.is_none() {
          let _ = reply.send(Err(RequestError::Unavailable));
        } else {
          self.maybe_reset(&document, force, Some(reply));
        }
      }
      ScopeMessage::WhenReady { reply } => match &self.current {
        Some(session) if session.is_ready() => {
          let _ = reply.send(session.id);
        }
        _ => self.ready_waiters.push(reply),
      },
      ScopeMessage::Status { reply } => {
        let _ = reply.send(self.status());
      }
      ScopeMessage::Shutdown => {}
    }
  }

  fn handle_event(&mut self, event: ScopeEvent) {
    match event {
      ScopeEvent::PreferencesLoaded {
        generation,
        root,
        config,
        exclusions,
      } => self.on_preferences_loaded(generation, root, *config, exclusions),
      ScopeEvent::DirectoryListed { session, result } => self.on_directory_listed(session, result),
      ScopeEvent::Primed { session, result } => {
        if let Err(e) = &result {
          warn!(session, error = %e, "Priming the active file failed");
        }
        self.on_primed(session, result.is_ok());
      }
      ScopeEvent::PreviousFlushed {
        session,
        path,
        untitled,
        result,
      } => {
        if let Err(e) = &result {
          warn!(session, error = %e, "Updating the previous document failed");
        }
        if !self.current.as_ref().is_some_and(|s| s.id == session) {
          trace!(session, "Flush finished for a retired session");
          return;
        }
        // The prime is not awaited; requests queue behind it in send order
        drop(self.prime(&path, untitled));
        self.on_session_ready(session);
      }
      ScopeEvent::SeedBatch { session, files } => self.on_seed_batch(session, files),
      ScopeEvent::SeedPhaseDone { session, phase } => self.on_seed_phase_done(session, phase),
      ScopeEvent::FileResolved { session, resolution } => {
        if let Some(path) = &resolution.resolved
          && let Some(session) = session.and_then(|id| self.session_mut(id))
        {
          session.record_resolution(resolution.name.clone(), path.clone());
        }
        self.send_to_worker(WorkerRequest::GetFile {
          file: resolution.name,
          text: resolution.text,
        });
      }
    }
  }

  // ==========================================================================
  // Worker gate
  // ==========================================================================

  /// Send now if the worker is ready, otherwise hold until WORKER_READY.
  fn send_to_worker(&mut self, message: WorkerRequest) {
    if self.worker_ready {
      self.transmit(message);
    } else {
      trace!(kind = message.name(), backlog = self.backlog.len() + 1, "Worker not ready, holding message");
      self.backlog.push(message);
    }
  }

  fn transmit(&self, message: WorkerRequest) {
    if self.config.lifecycle.debug {
      debug!(kind = message.name(), "Sending message to worker");
    } else {
      trace!(kind = message.name(), "Sending message to worker");
    }
    if let Err(e) = self.worker.send(message) {
      warn!(error = %e, "Failed to send message to worker");
    }
  }

  /// Configure the worker the first time, reset it afterwards.
  fn start_worker(&mut self) {
    if self.worker_started {
      self.reset_worker();
      return;
    }
    self.worker_started = true;
    self.worker_ready = false;
    info!("Starting worker");
    self.transmit(WorkerRequest::SetConfig {
      config: self.worker_config.clone(),
    });
  }

  fn reset_worker(&mut self) {
    if !self.worker_started {
      return;
    }
    self.worker_ready = false;
    debug!("Resetting worker");
    self.transmit(WorkerRequest::Reset);

    // Primes and flushes belong to the state the RESET discards
    let cancelled = self.correlator.cancel_kinds(SESSION_KINDS, RequestError::Cancelled);
    if cancelled > 0 {
      debug!(cancelled, "Cancelled session requests of the previous worker state");
    }
  }

  /// Session gate: queue on the current session until it is ready.
  fn post(&mut self, message: WorkerRequest) {
    let ready = match &self.current {
      Some(session) => session.is_ready(),
      None => {
        trace!(kind = message.name(), "No worker session, dropping message");
        return;
      }
    };
    if ready {
      self.send_to_worker(message);
    } else if let Some(session) = self.current.as_mut() {
      session.enqueue(message);
    }
  }

  // ==========================================================================
  // Worker events
  // ==========================================================================

  fn handle_worker_event(&mut self, event: WorkerEvent) {
    match event {
      WorkerEvent::WorkerReady => {
        self.worker_ready = true;
        let backlog = std::mem::take(&mut self.backlog);
        debug!(backlog = backlog.len(), "Worker ready");
        for message in backlog {
          self.transmit(message);
        }
      }
      WorkerEvent::GetFile { file } => self.serve_file(file),
      WorkerEvent::InferenceTimedOut { file } => self.on_inference_timeout(file),
      event => self.resolve_pending(event),
    }
  }

  fn resolve_pending(&mut self, event: WorkerEvent) {
    let Some((file, offset, kind)) = event.answers() else {
      return;
    };
    let file = file.to_string();
    if !self.worker_ready && SESSION_KINDS.contains(&kind) {
      trace!(file = %file, ?kind, "Dropping reply from before the worker reset");
      return;
    }
    let Some(pending) = self.correlator.take(&file, offset, kind) else {
      trace!(file = %file, ?offset, ?kind, "Dropping response with no pending request");
      return;
    };

    let result = match event.into_reply() {
      Ok(WorkerReply::Definition(mut location)) => {
        location.full_path = location.result_file.as_deref().and_then(|f| self.definition_path(f));
        Ok(WorkerReply::Definition(location))
      }
      Ok(reply) => Ok(reply),
      Err(error) => match WorkerReply::empty_for(kind) {
        Some(empty) => {
          debug!(file = %file, ?kind, error = %error, "Worker error, answering empty");
          Ok(empty)
        }
        None => {
          debug!(file = %file, ?kind, error = %error, "Worker reported an error");
          Err(RequestError::Worker(error))
        }
      },
    };
    pending.resolve(result);
  }

  /// Session the worker is currently loaded with.
  fn worker_session(&self) -> Option<&WorkerSession> {
    self.warming.as_ref().or(self.current.as_ref())
  }

  fn definition_path(&self, result_file: &str) -> Option<PathBuf> {
    if let Some(path) = self.worker_session().and_then(|s| s.resolved_path(result_file)) {
      return Some(path.to_path_buf());
    }
    let path = Path::new(result_file);
    path.is_absolute().then(|| path.to_path_buf())
  }

  fn serve_file(&mut self, name: String) {
    if self.exclusions.contains(Path::new(&name)) {
      debug!(name = %name, "Worker asked for an excluded file, answering empty");
      self.send_to_worker(WorkerRequest::GetFile {
        file: name,
        text: String::new(),
      });
      return;
    }

    let session = self.worker_session();
    let request = ResolveRequest {
      name,
      root_dir: session.map(|s| s.root_dir.clone()),
      project_root: session
        .and_then(|s| s.project_root.clone())
        .or_else(|| self.project_root.clone()),
      overlay: self.active.as_ref().map(|d| (d.path.clone(), d.text.clone())),
      max_file_size: self.config.limits.max_file_size,
    };
    let session = session.map(|s| s.id);

    let fs = self.fs.clone();
    let events = self.events_tx.clone();
    tokio::spawn(async move {
      let resolution = resolve_file(fs.as_ref(), request).await;
      let _ = events.send(ScopeEvent::FileResolved { session, resolution }).await;
    });
  }

  fn on_inference_timeout(&mut self, file: String) {
    let path = PathBuf::from(&file);
    let active = self.active.as_ref().map(|d| d.path.as_path());
    if let TimeoutOutcome::Excluded(path) = self.exclusions.on_timeout(&path, active) {
      let _ = self.notices.send(ScopeNotice::FileExcluded { path });
    }
  }

  // ==========================================================================
  // Requests
  // ==========================================================================

  fn handle_request(&mut self, request: HintRequest, document: DocumentSnapshot, cursor: Offset) -> PendingReply {
    if self.current.is_none() {
      debug!(path = %document.path.display(), "No worker session, rejecting request");
      return PendingReply::rejected(RequestError::Unavailable);
    }

    let kind = request.kind();
    let is_active = self.active.as_ref().is_some_and(|a| a.path == document.path);
    let pending = if is_active { self.changes.pending() } else { None };
    if is_active {
      self.active = Some(document.clone());
    }

    let engine = SyncEngine::new(&self.config.sync, self.config.limits.max_file_size);
    let file_info = engine.file_info(&document, pending, cursor, request.sync_mode());
    let offset = file_info.worker_offset(cursor);

    let key = RequestKey::new(file_info.name.clone(), offset, kind);
    let registration = self.correlator.register(key, &self.exclusions);
    if registration.is_new {
      if is_active {
        self.changes.clear();
      }
      trace!(file = %file_info.name, ?offset, ?kind, sync = ?file_info.kind, "Sending request");
      if let Some(message) = WorkerRequest::analysis(kind, file_info, offset, request.is_property()) {
        self.post(message);
      }
    }

    if registration.is_new && kind == RequestKind::Completions {
      self.maybe_reset(&document, false, None);
    }
    registration.reply
  }

  // ==========================================================================
  // Reset
  // ==========================================================================

  fn maybe_reset(&mut self, document: &DocumentSnapshot, force: bool, waiter: Option<oneshot::Sender<ResetReply>>) {
    if self.resetting {
      if let Some(waiter) = waiter {
        self.reset_waiters.push(waiter);
      }
      return;
    }

    let lifecycle = &self.config.lifecycle;
    let counted = !lifecycle.no_reset && {
      self.hint_count += 1;
      self.hint_count > lifecycle.max_hints_before_reset
    };
    let triggered = lifecycle.force_reset || force || counted;

    if !triggered {
      if let Some(waiter) = waiter {
        let reply = self.current.as_ref().map(|s| s.id).ok_or(RequestError::Unavailable);
        let _ = waiter.send(reply);
      }
      return;
    }

    info!(hint_count = self.hint_count, force, "Resetting worker session");
    self.resetting = true;
    self.hint_count = 0;
    if let Some(waiter) = waiter {
      self.reset_waiters.push(waiter);
    }
    self.start_session(document, Slot::Warming);
  }

  fn finish_reset(&mut self, result: ResetReply) {
    self.resetting = false;
    for waiter in self.reset_waiters.drain(..) {
      let _ = waiter.send(result.clone());
    }
  }

  // ==========================================================================
  // Activation
  // ==========================================================================

  fn on_editor_activated(&mut self, document: DocumentSnapshot, previous: Option<DocumentSnapshot>) {
    self.active = Some(document.clone());
    self.changes.clear();

    let session_busy = self.current.as_ref().is_some_and(|s| !s.is_ready());
    if !self.prefs_ready || session_busy {
      debug!(
        path = %document.path.display(),
        prefs_ready = self.prefs_ready,
        queued = self.activations.len() + 1,
        "Queueing editor activation"
      );
      self.activations.push_back((document, previous));
      return;
    }
    self.activate(document, previous);
  }

  fn drain_activations(&mut self) {
    while self.prefs_ready && self.current.as_ref().is_none_or(WorkerSession::is_ready) {
      let Some((document, previous)) = self.activations.pop_front() else {
        break;
      };
      self.activate(document, previous);
    }
  }

  fn activate(&mut self, document: DocumentSnapshot, previous: Option<DocumentSnapshot>) {
    let warm = self.current.as_ref().is_some_and(|s| s.can_skip_init(&document.path));
    if warm {
      self.warm_activate(document, previous);
    } else {
      self.cold_activate(document, previous);
    }
  }

  /// The worker already knows the file; push the previous buffer if it was
  /// edited, then re-prime.
  fn warm_activate(&mut self, document: DocumentSnapshot, previous: Option<DocumentSnapshot>) {
    let flush = previous.filter(|_| self.buffer_dirty);
    self.buffer_dirty = false;

    let Some(session) = self.current.as_mut() else {
      return;
    };
    let id = session.id;
    let Some(previous) = flush else {
      debug!(session = id, path = %document.path.display(), "Warm activation");
      return;
    };

    session.state = SessionState::Flushing;
    debug!(
      session = id,
      path = %document.path.display(),
      previous = %previous.path.display(),
      "Warm activation, flushing previous document"
    );

    let reply = self.update_file(&previous);
    let events = self.events_tx.clone();
    tokio::spawn(async move {
      let result = reply.await;
      let _ = events
        .send(ScopeEvent::PreviousFlushed {
          session: id,
          path: document.path,
          untitled: document.untitled,
          result,
        })
        .await;
    });
  }

  fn cold_activate(&mut self, document: DocumentSnapshot, previous: Option<DocumentSnapshot>) {
    if let Some(previous) = previous.filter(|p| p.dirty) {
      drop(self.update_file(&previous));
    }
    self.buffer_dirty = false;
    self.start_session(&document, Slot::Current);
  }

  fn start_session(&mut self, document: &DocumentSnapshot, slot: Slot) {
    let id = self.next_session;
    self.next_session += 1;
    self.sessions_created += 1;

    let dir = match document.untitled {
      true => None,
      false => document.dir().map(Path::to_path_buf),
    };
    let root_dir = dir
      .or_else(|| self.project_root.clone())
      .unwrap_or_else(|| PathBuf::from("/"));

    let session = WorkerSession::new(
      id,
      root_dir.clone(),
      self.project_root.clone(),
      document.path.clone(),
      document.untitled,
      self.cancel.child_token(),
    );
    info!(
      session = id,
      path = %document.path.display(),
      root = %root_dir.display(),
      ?slot,
      "Starting worker session"
    );

    match slot {
      Slot::Current => {
        if let Some(old) = self.current.replace(session) {
          old.retire();
        }
        if let Some(abandoned) = self.warming.take() {
          debug!(session = abandoned.id, "Abandoning warming session");
          abandoned.retire();
        }
      }
      Slot::Warming => {
        if let Some(old) = self.warming.replace(session) {
          old.retire();
        }
      }
    }

    if document.untitled {
      self.init_session(id, Vec::new());
      return;
    }

    let fs = self.fs.clone();
    let events = self.events_tx.clone();
    tokio::spawn(async move {
      let result = fs.list_dir(&root_dir).await;
      let _ = events.send(ScopeEvent::DirectoryListed { session: id, result }).await;
    });
  }

  fn on_directory_listed(&mut self, id: SessionId, result: Result<Vec<DirEntry>, FsError>) {
    let entries = match result {
      Ok(entries) => entries,
      Err(e) => {
        warn!(session = id, error = %e, "Failed to list the active directory");
        Vec::new()
      }
    };
    let mut files = self.seed_filter().eligible_files(&entries);
    files.truncate(self.config.limits.max_file_count);
    self.init_session(id, files);
  }

  /// Start the worker with the session's initial files and prime the active one.
  fn init_session(&mut self, id: SessionId, files: Vec<PathBuf>) {
    let Some(session) = self.session_mut(id) else {
      trace!(session = id, "Session retired before INIT");
      return;
    };
    session.begin_init(files.len());
    let dir = wire_path(&session.root_dir);
    let active = session.active_path.clone();
    let untitled = session.untitled;

    debug!(session = id, dir = %dir, files = files.len(), "Initializing worker");
    self.start_worker();
    self.send_to_worker(WorkerRequest::Init {
      dir,
      files: files.iter().map(|p| wire_path(p)).collect(),
      env: self.environment.clone(),
      timeout: self.config.limits.inference_timeout_ms,
    });

    let reply = self.prime(&active, untitled);
    let events = self.events_tx.clone();
    tokio::spawn(async move {
      let result = reply.await;
      let _ = events.send(ScopeEvent::Primed { session: id, result }).await;
    });
  }

  fn on_primed(&mut self, id: SessionId, primed: bool) {
    let Some(session) = self.session_mut(id) else {
      trace!(session = id, "Prime finished for a retired session");
      return;
    };
    let expand = primed && !session.untitled && !session.using_modules();
    self.on_session_ready(id);
    if expand {
      self.start_expansion(id, SeedPhase::Subdirectories);
    }
  }

  fn on_session_ready(&mut self, id: SessionId) {
    if self.warming.as_ref().is_some_and(|s| s.id == id)
      && let Some(warming) = self.warming.take()
    {
      if let Some(old) = self.current.replace(warming) {
        old.retire();
      }
      info!(session = id, "Reset complete");
    }

    let Some(session) = self.current.as_mut().filter(|s| s.id == id) else {
      return;
    };
    let queued = session.mark_ready();
    info!(session = id, queued = queued.len(), "Worker session ready");
    for message in queued {
      self.send_to_worker(message);
    }

    if self.resetting && self.warming.is_none() {
      self.finish_reset(Ok(id));
    }
    for waiter in self.ready_waiters.drain(..) {
      let _ = waiter.send(id);
    }

    if self.close_pending {
      self.close_project();
      return;
    }
    self.drain_activations();
  }

  /// Register and send UPDATE_FILE for `document`.
  fn update_file(&mut self, document: &DocumentSnapshot) -> PendingReply {
    let path = wire_path(&document.path);
    let key = RequestKey::new(path.clone(), Offset::ZERO, RequestKind::UpdateFile);
    let registration = self.correlator.register(key, &self.exclusions);
    if registration.is_new {
      let text = SyncEngine::new(&self.config.sync, self.config.limits.max_file_size).filter_text(&document.text);
      self.send_to_worker(WorkerRequest::UpdateFile { path, text });
    }
    registration.reply
  }

  /// Register and send PRIME_PUMP for `path`.
  fn prime(&mut self, path: &Path, untitled: bool) -> PendingReply {
    let name = wire_path(path);
    let key = RequestKey::new(name.clone(), Offset::ZERO, RequestKind::PrimePump);
    let registration = self.correlator.register(key, &self.exclusions);
    if registration.is_new {
      self.send_to_worker(WorkerRequest::PrimePump {
        path: name,
        is_untitled: untitled,
      });
    }
    registration.reply
  }

  fn session_mut(&mut self, id: SessionId) -> Option<&mut WorkerSession> {
    if self.current.as_ref().is_some_and(|s| s.id == id) {
      return self.current.as_mut();
    }
    self.warming.as_mut().filter(|s| s.id == id)
  }

  // ==========================================================================
  // Seeding
  // ==========================================================================

  fn seed_filter(&self) -> SeedFilter {
    SeedFilter {
      patterns: self.patterns.clone(),
      language: self.config.language.clone(),
      excluded: self.exclusions.entries().iter().cloned().collect(),
      project_root: self.project_root.clone(),
    }
  }

  fn start_expansion(&mut self, id: SessionId, phase: SeedPhase) {
    let filter = Arc::new(self.seed_filter());
    let Some(session) = self.session_mut(id) else {
      return;
    };
    let start = match phase {
      SeedPhase::Subdirectories => session.root_dir.clone(),
      SeedPhase::ProjectRoot => match &session.project_root {
        Some(root) => root.clone(),
        None => return,
      },
    };
    session.expanding = true;
    debug!(session = id, ?phase, start = %start.display(), "Expanding seed set");

    let walk = SeedWalk {
      session: id,
      phase,
      start,
      covered: session.root_dir.clone(),
      filter,
    };
    let stop = session.seeding_token();
    tokio::spawn(walk.run(self.fs.clone(), self.events_tx.clone(), stop));
  }

  fn on_seed_batch(&mut self, id: SessionId, files: Vec<PathBuf>) {
    let max_file_count = self.config.limits.max_file_count;
    let Some(session) = self.session_mut(id) else {
      return;
    };
    let offered = files.len();
    let added = session.add_files(files, max_file_count);
    if added.limit_reached {
      info!(session = id, max_file_count, "File limit reached, no more files will be added");
    }
    if added.files.is_empty() {
      return;
    }
    trace!(session = id, offered, added = added.files.len(), "Adding files");
    self.send_to_worker(WorkerRequest::AddFiles {
      files: added.files.iter().map(|p| wire_path(p)).collect(),
    });
  }

  fn on_seed_phase_done(&mut self, id: SessionId, phase: SeedPhase) {
    let Some(session) = self.session_mut(id) else {
      return;
    };
    let expand_to_root = phase == SeedPhase::Subdirectories
      && session
        .project_root
        .as_ref()
        .is_some_and(|root| session.root_dir != *root && session.root_dir.starts_with(root));
    if expand_to_root {
      self.start_expansion(id, SeedPhase::ProjectRoot);
      return;
    }

    let active = session.active_path.clone();
    self.finish_expansion(id);
    // Pick up whatever the expansion pulled in
    drop(self.prime(&active, false));
  }

  fn finish_expansion(&mut self, id: SessionId) {
    if let Some(session) = self.session_mut(id) {
      session.expanding = false;
      let (initial, resolved, added) = session.counts();
      info!(session = id, initial, resolved, added, "Seeding finished");
    }
  }

  // ==========================================================================
  // Project lifecycle
  // ==========================================================================

  fn on_project_opened(&mut self, root: PathBuf) {
    self.prefs_generation += 1;
    self.prefs_ready = false;
    self.project_root = Some(root.clone());
    info!(root = %root.display(), "Project opened, loading preferences");

    let generation = self.prefs_generation;
    let events = self.events_tx.clone();
    tokio::spawn(async move {
      let config = Config::load_for_project(&root).await;
      let exclusions = load_exclusions(&exclusions_path(&root)).await;
      let _ = events
        .send(ScopeEvent::PreferencesLoaded {
          generation,
          root,
          config: Box::new(config),
          exclusions,
        })
        .await;
    });
  }

  fn on_preferences_loaded(&mut self, generation: u64, root: PathBuf, config: Config, exclusions: Vec<PathBuf>) {
    if generation != self.prefs_generation {
      debug!(root = %root.display(), "Ignoring preferences of a previous project");
      return;
    }

    info!(
      root = %root.display(),
      excluded = exclusions.len(),
      max_file_count = config.limits.max_file_count,
      "Preferences loaded"
    );
    self.patterns = config.exclusions.compile();
    self.config = config;
    self.exclusions = ExclusionList::persisted(exclusions_path(&root), exclusions);
    self.prefs_ready = true;
    self.drain_activations();
  }

  fn on_project_closed(&mut self) {
    info!("Project closed");
    self.post(WorkerRequest::ClearDirtyFiles);

    self.prefs_generation += 1;
    self.prefs_ready = true;
    self.project_root = None;
    self.activations.clear();
    self.active = None;
    self.changes.clear();
    self.buffer_dirty = false;

    if let Some(abandoned) = self.warming.take() {
      abandoned.retire();
    }
    if self.resetting {
      self.finish_reset(Err(RequestError::Cancelled));
    }

    match &self.current {
      Some(session) if !session.is_ready() => {
        debug!(session = session.id, "Session still starting, closing once ready");
        self.close_pending = true;
      }
      Some(_) => self.close_project(),
      None => {}
    }
  }

  fn close_project(&mut self) {
    self.close_pending = false;
    if let Some(session) = self.current.take() {
      session.retire();
    }
    self.reset_worker();
  }

  // ==========================================================================
  // Status
  // ==========================================================================

  fn status(&self) -> ScopeStatus {
    ScopeStatus {
      session: self.current.as_ref().map(session_status),
      warming: self.warming.as_ref().map(|s| s.id),
      reset_in_progress: self.resetting,
      hint_count: self.hint_count,
      sessions_created: self.sessions_created,
      pending_requests: self.correlator.len(),
      worker_ready: self.worker_ready,
      queued_activations: self.activations.len(),
      preferences_ready: self.prefs_ready,
      excluded: self.exclusions.entries().to_vec(),
    }
  }
}

fn session_status(session: &WorkerSession) -> SessionStatus {
  let (initial_files, resolved_files, added_files) = session.counts();
  SessionStatus {
    id: session.id,
    state: session.state,
    root_dir: session.root_dir.clone(),
    project_root: session.project_root.clone(),
    initial_files,
    resolved_files,
    added_files,
    limit_reached: session.limit_reached(),
    using_modules: session.using_modules(),
    expanding: session.expanding,
  }
}
