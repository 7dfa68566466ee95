//! Probe command
//!
//! Starts a worker process, opens a project, activates one file and runs a
//! single request against it, printing the reply as JSON.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use codehints::{
  ScopeActor, ScopeHandle, ScopeOptions,
  config::Config,
  document::{DocumentSnapshot, Offset},
  fs::LocalFileSystem,
  ipc::Completions,
  worker::{ProcessWorker, WorkerCommand},
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::project_dir;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProbeRequest {
  Completions,
  Properties,
  ParamHint,
  Guesses,
  Definition,
  Scope,
  References,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
  /// Worker program speaking the line-delimited JSON protocol
  #[arg(long)]
  pub worker: PathBuf,
  /// Extra arguments for the worker program
  #[arg(long = "worker-arg", value_name = "ARG")]
  pub worker_args: Vec<String>,
  /// Project directory (default: current directory)
  #[arg(short, long)]
  pub project: Option<PathBuf>,
  /// File to activate, relative to the project
  pub file: PathBuf,
  /// Zero-based cursor line
  #[arg(long, default_value_t = 0)]
  pub line: u32,
  /// Zero-based cursor column
  #[arg(long, default_value_t = 0)]
  pub ch: u32,
  #[arg(short, long, value_enum, default_value = "completions")]
  pub request: ProbeRequest,
  /// JSON type definition files handed to the worker
  #[arg(long = "defs", value_name = "FILE")]
  pub definitions: Vec<PathBuf>,
  /// Treat the file as script embedded in markup
  #[arg(long)]
  pub embedded: bool,
  /// Give up after this many milliseconds
  #[arg(long, default_value_t = 15_000)]
  pub timeout_ms: u64,
  /// Print actor status after the request
  #[arg(long)]
  pub status: bool,
}

pub async fn cmd_probe(args: ProbeArgs) -> Result<()> {
  let root = project_dir(args.project.as_deref())?;
  let path = root.join(&args.file);
  let text = tokio::fs::read_to_string(&path)
    .await
    .with_context(|| format!("Failed to read {}", path.display()))?;

  let mut environment = Vec::new();
  for file in &args.definitions {
    let content = tokio::fs::read_to_string(file)
      .await
      .with_context(|| format!("Failed to read {}", file.display()))?;
    let definitions: Value =
      serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", file.display()))?;
    environment.push(definitions);
  }

  let cancel = CancellationToken::new();
  let command = args
    .worker_args
    .iter()
    .fold(WorkerCommand::new(&args.worker), |command, arg| command.arg(arg.as_str()))
    .cwd(&root);
  let connection = ProcessWorker::spawn(command, cancel.clone()).context("Failed to start worker")?;

  let options = ScopeOptions {
    config: Config::load_for_project(&root).await,
    environment,
    worker_config: json!({}),
  };
  let handle = ScopeActor::spawn(connection, Arc::new(LocalFileSystem), options, cancel.clone());

  let mut document = DocumentSnapshot::new(path, text);
  if args.embedded {
    document = document.embedded();
  }

  let timeout = Duration::from_millis(args.timeout_ms);
  let result = tokio::time::timeout(timeout, run(&handle, &root, document, &args)).await;

  if args.status
    && let Ok(status) = handle.status().await
  {
    eprintln!("{}", serde_json::to_string_pretty(&status)?);
  }
  let _ = handle.shutdown().await;
  cancel.cancel();

  match result {
    Ok(output) => {
      println!("{}", serde_json::to_string_pretty(&output?)?);
      Ok(())
    }
    Err(_) => bail!("Timed out after {}ms", args.timeout_ms),
  }
}

async fn run(handle: &ScopeHandle, root: &std::path::Path, document: DocumentSnapshot, args: &ProbeArgs) -> Result<Value> {
  handle.on_project_opened(root).await?;
  handle.on_active_editor_changed(document.clone(), None).await?;
  let session = handle.when_ready().await?;
  info!(session, "Worker session ready");

  let cursor = Offset::new(args.line, args.ch);
  debug!(?cursor, request = ?args.request, "Sending request");
  let output = match args.request {
    ProbeRequest::Completions | ProbeRequest::Properties => {
      let is_property = matches!(args.request, ProbeRequest::Properties);
      match handle.request_completions(document, cursor, is_property).await? {
        Completions::Hints(hints) => json!({ "completions": hints }),
        Completions::Properties(properties) => json!({ "properties": properties }),
      }
    }
    ProbeRequest::ParamHint => handle.request_parameter_hint(document, cursor).await?,
    ProbeRequest::Guesses => json!(handle.request_property_guesses(document, cursor).await?),
    ProbeRequest::Definition => {
      let location = handle.request_jump_to_definition(document, cursor).await?;
      json!({
        "resultFile": location.result_file,
        "fullPath": location.full_path,
        "start": location.start,
        "end": location.end,
      })
    }
    ProbeRequest::Scope => handle.request_scope_data(document, cursor).await?,
    ProbeRequest::References => handle.request_references(document, cursor).await?,
  };
  Ok(output)
}
