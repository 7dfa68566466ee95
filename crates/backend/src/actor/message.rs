//! Actor message types
//!
//! [`ScopeMessage`]s come from the [`ScopeHandle`](super::handle::ScopeHandle);
//! [`ScopeEvent`]s are posted back by tasks the actor spawned while waiting
//! on the worker or the filesystem.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::{
  correlator::{PendingReply, RequestError, RequestResult},
  resolver::Resolution,
  seeding::SeedPhase,
  session::{SessionId, SessionState},
  sync::SyncMode,
};
use crate::{
  domain::{
    config::Config,
    document::{DocumentSnapshot, EditChange, Offset},
  },
  fs::{DirEntry, FsError},
  ipc::RequestKind,
};

pub type ResetReply = Result<SessionId, RequestError>;

// ============================================================================
// Requests
// ============================================================================

/// Analysis requests the UI can make at a cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintRequest {
  Completions { is_property: bool },
  ParameterHint,
  PropertyGuesses,
  JumpToDefinition,
  ScopeData,
  References,
}

impl HintRequest {
  pub fn kind(self) -> RequestKind {
    match self {
      Self::Completions { .. } => RequestKind::Completions,
      Self::ParameterHint => RequestKind::CalledFunctionType,
      Self::PropertyGuesses => RequestKind::GetGuesses,
      Self::JumpToDefinition => RequestKind::JumpToDef,
      Self::ScopeData => RequestKind::ScopeData,
      Self::References => RequestKind::FindRefs,
    }
  }

  /// Fragments only for requests whose replies carry no buffer positions.
  pub fn sync_mode(self) -> SyncMode {
    match self {
      Self::Completions { .. } | Self::PropertyGuesses => SyncMode::Incremental,
      Self::ParameterHint | Self::ScopeData | Self::References => SyncMode::NoPartial,
      Self::JumpToDefinition => SyncMode::ForceFull,
    }
  }

  pub fn is_property(self) -> bool {
    matches!(self, Self::Completions { is_property: true })
  }
}

// ============================================================================
// Handle → actor
// ============================================================================

#[derive(Debug)]
pub enum ScopeMessage {
  EditorActivated {
    document: DocumentSnapshot,
    previous: Option<DocumentSnapshot>,
  },
  BufferEdited {
    changes: Vec<EditChange>,
  },
  ProjectOpened {
    root: PathBuf,
  },
  ProjectClosed,
  DirtyFlagChanged {
    path: PathBuf,
    dirty: bool,
  },
  SetWorkerConfig {
    config: Value,
  },
  Request {
    request: HintRequest,
    document: DocumentSnapshot,
    cursor: Offset,
    reply: oneshot::Sender<PendingReply>,
  },
  Reset {
    document: DocumentSnapshot,
    force: bool,
    reply: oneshot::Sender<ResetReply>,
  },
  WhenReady {
    reply: oneshot::Sender<SessionId>,
  },
  Status {
    reply: oneshot::Sender<ScopeStatus>,
  },
  Shutdown,
}

// ============================================================================
// Spawned tasks → actor
// ============================================================================

#[derive(Debug)]
pub enum ScopeEvent {
  PreferencesLoaded {
    generation: u64,
    root: PathBuf,
    config: Box<Config>,
    exclusions: Vec<PathBuf>,
  },
  DirectoryListed {
    session: SessionId,
    result: Result<Vec<DirEntry>, FsError>,
  },
  /// The active file of a cold activation was primed
  Primed {
    session: SessionId,
    result: RequestResult,
  },
  /// The previous document's text reached the worker on a warm activation;
  /// `path` is the newly active document to prime next
  PreviousFlushed {
    session: SessionId,
    path: PathBuf,
    untitled: bool,
    result: RequestResult,
  },
  SeedBatch {
    session: SessionId,
    files: Vec<PathBuf>,
  },
  SeedPhaseDone {
    session: SessionId,
    phase: SeedPhase,
  },
  FileResolved {
    session: Option<SessionId>,
    resolution: Resolution,
  },
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
  pub id: SessionId,
  pub state: SessionState,
  pub root_dir: PathBuf,
  pub project_root: Option<PathBuf>,
  pub initial_files: usize,
  pub resolved_files: usize,
  pub added_files: usize,
  pub limit_reached: bool,
  pub using_modules: bool,
  pub expanding: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeStatus {
  pub session: Option<SessionStatus>,
  /// Replacement session warming up during a reset
  pub warming: Option<SessionId>,
  pub reset_in_progress: bool,
  pub hint_count: u32,
  pub sessions_created: u64,
  pub pending_requests: usize,
  pub worker_ready: bool,
  pub queued_activations: usize,
  pub preferences_ready: bool,
  pub excluded: Vec<PathBuf>,
}
