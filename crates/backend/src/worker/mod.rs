//! The worker boundary.
//!
//! The analysis worker is reachable only through message passing: the host
//! sends [`WorkerRequest`]s through a [`WorkerChannel`] and receives
//! [`WorkerEvent`]s from a stream. Sends never block and are delivered in
//! send order; replies may arrive in any order.

mod process;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use process::{ProcessWorker, WorkerCommand};

use crate::ipc::{WorkerEvent, WorkerRequest};

#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
  #[error("Failed to spawn worker: {0}")]
  Spawn(String),
  #[error("Worker channel closed")]
  Closed,
  #[error("Codec error: {0}")]
  Codec(String),
}

impl From<tokio_util::codec::LinesCodecError> for WorkerError {
  fn from(err: tokio_util::codec::LinesCodecError) -> Self {
    WorkerError::Codec(err.to_string())
  }
}

/// Outbound half of the worker boundary.
pub trait WorkerChannel: Send + Sync {
  fn send(&self, message: WorkerRequest) -> Result<(), WorkerError>;
}

/// Both halves of a connected worker.
pub struct WorkerConnection {
  pub channel: Arc<dyn WorkerChannel>,
  pub events: mpsc::Receiver<WorkerEvent>,
}

impl WorkerConnection {
  pub fn new(channel: Arc<dyn WorkerChannel>, events: mpsc::Receiver<WorkerEvent>) -> Self {
    Self { channel, events }
  }
}
