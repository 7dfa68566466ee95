//! Child-process worker speaking newline-delimited JSON over stdio.

use std::{path::PathBuf, process::Stdio, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::{
  process::{Child, ChildStdin, ChildStdout, Command},
  sync::mpsc,
};
use tokio_util::{
  codec::{FramedRead, FramedWrite, LinesCodec},
  sync::CancellationToken,
};
use tracing::{debug, error, info, warn};

use super::{WorkerChannel, WorkerConnection, WorkerError};
use crate::ipc::{WorkerEvent, WorkerRequest};

/// How to launch the worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
}

impl WorkerCommand {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }
}

/// [`WorkerChannel`] that forwards messages to a child process.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
  outbound: mpsc::UnboundedSender<WorkerRequest>,
}

impl ProcessWorker {
  /// Spawn the worker process and wire up its stdio.
  ///
  /// The process is killed when `cancel` fires or when every channel handle
  /// has been dropped.
  pub fn spawn(command: WorkerCommand, cancel: CancellationToken) -> Result<WorkerConnection, WorkerError> {
    let mut cmd = Command::new(&command.program);
    cmd
      .args(&command.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .kill_on_drop(true);
    if let Some(cwd) = &command.cwd {
      cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn().map_err(|e| WorkerError::Spawn(e.to_string()))?;
    let stdin = child
      .stdin
      .take()
      .ok_or_else(|| WorkerError::Spawn("worker stdin unavailable".to_string()))?;
    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| WorkerError::Spawn("worker stdout unavailable".to_string()))?;

    info!(program = %command.program.display(), pid = ?child.id(), "Worker process started");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(256);

    tokio::spawn(writer_task(stdin, outbound_rx, cancel.clone()));
    tokio::spawn(reader_task(stdout, event_tx, cancel.clone()));
    tokio::spawn(supervise(child, cancel));

    let channel: Arc<dyn WorkerChannel> = Arc::new(ProcessWorker { outbound: outbound_tx });
    Ok(WorkerConnection::new(channel, event_rx))
  }
}

impl WorkerChannel for ProcessWorker {
  fn send(&self, message: WorkerRequest) -> Result<(), WorkerError> {
    self.outbound.send(message).map_err(|_| WorkerError::Closed)
  }
}

async fn writer_task(
  stdin: ChildStdin,
  mut outbound: mpsc::UnboundedReceiver<WorkerRequest>,
  cancel: CancellationToken,
) {
  let mut sink = FramedWrite::new(stdin, LinesCodec::new());

  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => break,

      message = outbound.recv() => {
        let Some(message) = message else {
          debug!("Worker channel dropped, closing stdin");
          break;
        };
        let line = match serde_json::to_string(&message) {
          Ok(line) => line,
          Err(e) => {
            error!(kind = message.name(), error = %e, "Failed to encode worker message");
            continue;
          }
        };
        if let Err(e) = sink.send(line).await {
          warn!(error = %WorkerError::from(e), "Failed to write to worker");
          break;
        }
      }
    }
  }
}

async fn reader_task(stdout: ChildStdout, events: mpsc::Sender<WorkerEvent>, cancel: CancellationToken) {
  let mut stream = FramedRead::new(stdout, LinesCodec::new());

  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => break,

      line = stream.next() => {
        match line {
          Some(Ok(line)) => {
            if line.trim().is_empty() {
              continue;
            }
            match serde_json::from_str::<WorkerEvent>(&line) {
              Ok(event) => {
                if events.send(event).await.is_err() {
                  debug!("Event receiver dropped");
                  break;
                }
              }
              Err(e) => warn!(error = %e, line = %line, "Worker sent an unrecognized event"),
            }
          }
          Some(Err(e)) => {
            error!(error = %WorkerError::from(e), "Worker output error");
            break;
          }
          None => {
            info!("Worker closed its output");
            break;
          }
        }
      }
    }
  }
}

async fn supervise(mut child: Child, cancel: CancellationToken) {
  tokio::select! {
    _ = cancel.cancelled() => {
      if let Err(e) = child.kill().await {
        debug!(error = %e, "Worker already exited");
      }
    }
    status = child.wait() => {
      match status {
        Ok(status) => info!(%status, "Worker process exited"),
        Err(e) => warn!(error = %e, "Failed to wait on worker process"),
      }
    }
  }
}
