//! Request correlation.
//!
//! Pending requests are keyed by `(file, offset, kind)`. Responses are matched
//! by the identity they echo, never by arrival order. Callers registering an
//! identity that is already pending share the same eventual result, so at
//! most one message per identity is ever in flight.

use std::{
  collections::HashMap,
  future::Future,
  path::Path,
  pin::Pin,
  task::{Context, Poll},
};

use tokio::sync::oneshot;
use tracing::trace;

use super::exclusion::ExclusionList;
use crate::{
  domain::document::Offset,
  ipc::{RequestKind, WorkerReply},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
  #[error("File is excluded from analysis")]
  Excluded,
  #[error("Worker reported an error: {0}")]
  Worker(String),
  #[error("Request was dropped before a response arrived")]
  Cancelled,
  #[error("Code-hint service is unavailable")]
  Unavailable,
}

pub type RequestResult = Result<WorkerReply, RequestError>;

/// Identity of an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub file: String,
  pub offset: Offset,
  pub kind: RequestKind,
}

impl RequestKey {
  pub fn new(file: impl Into<String>, offset: Offset, kind: RequestKind) -> Self {
    Self {
      file: file.into(),
      offset,
      kind,
    }
  }
}

/// Everyone waiting on one identity.
#[derive(Debug, Default)]
pub struct PendingRequest {
  waiters: Vec<oneshot::Sender<RequestResult>>,
}

impl PendingRequest {
  /// Deliver `result` to every waiter. Waiters that stopped listening are skipped.
  pub fn resolve(self, result: RequestResult) {
    for waiter in self.waiters {
      let _ = waiter.send(result.clone());
    }
  }

  pub fn waiters(&self) -> usize {
    self.waiters.len()
  }
}

/// Future side of a registration.
#[derive(Debug)]
pub struct PendingReply {
  inner: ReplyInner,
}

#[derive(Debug)]
enum ReplyInner {
  Waiting(oneshot::Receiver<RequestResult>),
  Ready(Option<RequestResult>),
}

impl PendingReply {
  fn waiting(rx: oneshot::Receiver<RequestResult>) -> Self {
    Self {
      inner: ReplyInner::Waiting(rx),
    }
  }

  /// A reply that is already failed.
  pub fn rejected(err: RequestError) -> Self {
    Self {
      inner: ReplyInner::Ready(Some(Err(err))),
    }
  }
}

impl Future for PendingReply {
  type Output = RequestResult;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match &mut self.get_mut().inner {
      ReplyInner::Waiting(rx) => Pin::new(rx)
        .poll(cx)
        .map(|received| received.unwrap_or(Err(RequestError::Cancelled))),
      ReplyInner::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(RequestError::Cancelled))),
    }
  }
}

#[derive(Debug)]
pub struct Registration {
  pub reply: PendingReply,
  /// True when this call created the entry and the caller must send the message
  pub is_new: bool,
}

/// Table of pending requests, bucketed by file.
#[derive(Debug, Default)]
pub struct Correlator {
  pending: HashMap<String, HashMap<(Offset, RequestKind), PendingRequest>>,
}

impl Correlator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register interest in `key`.
  ///
  /// Excluded files get an already-rejected reply and nothing is recorded.
  pub fn register(&mut self, key: RequestKey, exclusions: &ExclusionList) -> Registration {
    if exclusions.contains(Path::new(&key.file)) {
      trace!(file = %key.file, kind = ?key.kind, "Rejecting request for excluded file");
      return Registration {
        reply: PendingReply::rejected(RequestError::Excluded),
        is_new: false,
      };
    }

    let (tx, rx) = oneshot::channel();
    let bucket = self.pending.entry(key.file).or_default();
    let slot = (key.offset, key.kind);
    let is_new = !bucket.contains_key(&slot);
    bucket.entry(slot).or_default().waiters.push(tx);

    Registration {
      reply: PendingReply::waiting(rx),
      is_new,
    }
  }

  /// Remove and return the entry for `key`, dropping the file's bucket once empty.
  pub fn take(&mut self, file: &str, offset: Offset, kind: RequestKind) -> Option<PendingRequest> {
    let bucket = self.pending.get_mut(file)?;
    let request = bucket.remove(&(offset, kind));
    if bucket.is_empty() {
      self.pending.remove(file);
    }
    request
  }

  /// Number of pending identities.
  pub fn len(&self) -> usize {
    self.pending.values().map(HashMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  pub fn files(&self) -> usize {
    self.pending.len()
  }

  /// Fail every pending entry of the given kinds, returning how many there were.
  pub fn cancel_kinds(&mut self, kinds: &[RequestKind], err: RequestError) -> usize {
    let mut cancelled = 0;
    self.pending.retain(|_, bucket| {
      bucket.retain(|(_, kind), request| {
        if !kinds.contains(kind) {
          return true;
        }
        cancelled += 1;
        std::mem::take(request).resolve(Err(err.clone()));
        false
      });
      !bucket.is_empty()
    });
    cancelled
  }

  /// Fail everything still pending.
  pub fn drain(&mut self, err: RequestError) {
    for (_, bucket) in self.pending.drain() {
      for (_, request) in bucket {
        request.resolve(Err(err.clone()));
      }
    }
  }
}
