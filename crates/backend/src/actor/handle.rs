//! Handle for talking to the [`ScopeActor`](super::coordinator::ScopeActor)
//!
//! The handle is cheap to clone. Editor notifications are fire-and-forget;
//! analysis requests return once the actor has registered them and then
//! resolve when the worker answers.

use std::path::PathBuf;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{
  correlator::{PendingReply, RequestError},
  exclusion::ScopeNotice,
  message::{HintRequest, ScopeMessage, ScopeStatus},
  session::SessionId,
};
use crate::{
  domain::document::{DocumentSnapshot, EditChange, Offset},
  ipc::{Completions, DefinitionLocation, WorkerReply},
};

// ============================================================================
// Scope Handle
// ============================================================================

#[derive(Clone, Debug)]
pub struct ScopeHandle {
  tx: mpsc::Sender<ScopeMessage>,
  notices: broadcast::Sender<ScopeNotice>,
}

impl ScopeHandle {
  pub fn new(tx: mpsc::Sender<ScopeMessage>, notices: broadcast::Sender<ScopeNotice>) -> Self {
    Self { tx, notices }
  }

  async fn send(&self, msg: ScopeMessage) -> Result<(), ScopeError> {
    self.tx.send(msg).await.map_err(|_| ScopeError::ActorGone)
  }

  /// The active editor changed to `document`. `previous` is the document
  /// that was active before, if any.
  pub async fn on_active_editor_changed(
    &self,
    document: DocumentSnapshot,
    previous: Option<DocumentSnapshot>,
  ) -> Result<(), ScopeError> {
    self.send(ScopeMessage::EditorActivated { document, previous }).await
  }

  /// Edits were applied to the active document.
  pub async fn on_buffer_edited(&self, changes: Vec<EditChange>) -> Result<(), ScopeError> {
    self.send(ScopeMessage::BufferEdited { changes }).await
  }

  pub async fn on_project_opened(&self, root: impl Into<PathBuf>) -> Result<(), ScopeError> {
    self.send(ScopeMessage::ProjectOpened { root: root.into() }).await
  }

  pub async fn on_project_closed(&self) -> Result<(), ScopeError> {
    self.send(ScopeMessage::ProjectClosed).await
  }

  /// A document gained or lost unsaved modifications.
  pub async fn update_dirty_flag(&self, path: impl Into<PathBuf>, dirty: bool) -> Result<(), ScopeError> {
    self
      .send(ScopeMessage::DirtyFlagChanged {
        path: path.into(),
        dirty,
      })
      .await
  }

  /// Replace the worker configuration. Also used for every later worker start.
  pub async fn set_worker_config(&self, config: Value) -> Result<(), ScopeError> {
    self.send(ScopeMessage::SetWorkerConfig { config }).await
  }

  /// Register a request and get its reply future without waiting for the worker.
  ///
  /// Requests with the same file, worker offset and kind share one reply.
  pub async fn submit(
    &self,
    request: HintRequest,
    document: DocumentSnapshot,
    cursor: Offset,
  ) -> Result<PendingReply, RequestError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(ScopeMessage::Request {
        request,
        document,
        cursor,
        reply,
      })
      .await
      .map_err(|_| RequestError::Unavailable)?;
    rx.await.map_err(|_| RequestError::Unavailable)
  }

  async fn request(
    &self,
    request: HintRequest,
    document: DocumentSnapshot,
    cursor: Offset,
  ) -> Result<WorkerReply, RequestError> {
    self.submit(request, document, cursor).await?.await
  }

  pub async fn request_completions(
    &self,
    document: DocumentSnapshot,
    cursor: Offset,
    is_property: bool,
  ) -> Result<Completions, RequestError> {
    match self
      .request(HintRequest::Completions { is_property }, document, cursor)
      .await?
    {
      WorkerReply::Completions(completions) => Ok(completions),
      other => Err(unexpected(other)),
    }
  }

  /// Type of the function called at `function_offset` (the call's opening position).
  pub async fn request_parameter_hint(
    &self,
    document: DocumentSnapshot,
    function_offset: Offset,
  ) -> Result<Value, RequestError> {
    match self
      .request(HintRequest::ParameterHint, document, function_offset)
      .await?
    {
      WorkerReply::FunctionType(fn_type) => Ok(fn_type),
      other => Err(unexpected(other)),
    }
  }

  pub async fn request_property_guesses(
    &self,
    document: DocumentSnapshot,
    cursor: Offset,
  ) -> Result<Vec<String>, RequestError> {
    match self.request(HintRequest::PropertyGuesses, document, cursor).await? {
      WorkerReply::Guesses(properties) => Ok(properties),
      other => Err(unexpected(other)),
    }
  }

  pub async fn request_jump_to_definition(
    &self,
    document: DocumentSnapshot,
    cursor: Offset,
  ) -> Result<DefinitionLocation, RequestError> {
    match self.request(HintRequest::JumpToDefinition, document, cursor).await? {
      WorkerReply::Definition(location) => Ok(location),
      other => Err(unexpected(other)),
    }
  }

  pub async fn request_scope_data(&self, document: DocumentSnapshot, cursor: Offset) -> Result<Value, RequestError> {
    match self.request(HintRequest::ScopeData, document, cursor).await? {
      WorkerReply::Scope(scope) => Ok(scope),
      other => Err(unexpected(other)),
    }
  }

  pub async fn request_references(&self, document: DocumentSnapshot, cursor: Offset) -> Result<Value, RequestError> {
    match self.request(HintRequest::References, document, cursor).await? {
      WorkerReply::References(references) => Ok(references),
      other => Err(unexpected(other)),
    }
  }

  /// Replace the worker session if `force` is set or the hint count says so.
  ///
  /// Concurrent resets join the one in progress. Resolves with the id of the
  /// session serving requests afterwards.
  pub async fn reset(&self, document: DocumentSnapshot, force: bool) -> Result<SessionId, RequestError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(ScopeMessage::Reset { document, force, reply })
      .await
      .map_err(|_| RequestError::Unavailable)?;
    rx.await.map_err(|_| RequestError::Cancelled)?
  }

  /// Wait until the current worker session is ready.
  pub async fn when_ready(&self) -> Result<SessionId, ScopeError> {
    let (reply, rx) = oneshot::channel();
    self.send(ScopeMessage::WhenReady { reply }).await?;
    rx.await.map_err(|_| ScopeError::ActorGone)
  }

  pub async fn status(&self) -> Result<ScopeStatus, ScopeError> {
    let (reply, rx) = oneshot::channel();
    self.send(ScopeMessage::Status { reply }).await?;
    rx.await.map_err(|_| ScopeError::ActorGone)
  }

  /// Subscribe to informational notices (files excluded after timeouts).
  pub fn notices(&self) -> broadcast::Receiver<ScopeNotice> {
    self.notices.subscribe()
  }

  pub async fn shutdown(&self) -> Result<(), ScopeError> {
    self.send(ScopeMessage::Shutdown).await
  }
}

fn unexpected(reply: WorkerReply) -> RequestError {
  RequestError::Worker(format!("unexpected reply: {reply:?}"))
}

// ============================================================================
// Errors
// ============================================================================

/// Error when sending to the actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScopeError {
  #[error("Scope actor has shut down")]
  ActorGone,
}
