//! Answers the worker's requests for file contents.
//!
//! The worker asks for files by the name it saw (an absolute path, a path
//! relative to the script root, or a bare module path). Lookups are tried in
//! order and the first readable file wins; when all fail the worker gets
//! empty content so its analysis never stalls.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use tracing::{debug, trace};

use crate::fs::FileSystem;

#[derive(Debug, Clone)]
pub struct ResolveRequest {
  pub name: String,
  pub root_dir: Option<PathBuf>,
  pub project_root: Option<PathBuf>,
  /// Open buffer served instead of the disk contents of its path
  pub overlay: Option<(PathBuf, Arc<str>)>,
  pub max_file_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub name: String,
  /// Where the name resolved, if anywhere
  pub resolved: Option<PathBuf>,
  pub text: String,
}

fn looks_like_url(name: &str) -> bool {
  name.contains("://") || name.starts_with("//")
}

async fn read(fs: &dyn FileSystem, request: &ResolveRequest, path: &Path) -> Option<String> {
  if let Some((open_path, text)) = &request.overlay
    && open_path == path
  {
    return Some(text.to_string());
  }
  match fs.read_text(path).await {
    Ok(text) => Some(text),
    Err(e) => {
      trace!(path = %path.display(), error = %e, "Lookup failed");
      None
    }
  }
}

/// Resolve `request.name` to file contents.
pub async fn resolve_file(fs: &dyn FileSystem, request: ResolveRequest) -> Resolution {
  let relative = request.name.trim_start_matches('/');

  let mut candidates = Vec::new();
  if !looks_like_url(&request.name) {
    candidates.push(PathBuf::from(format!("/{relative}")));
  }
  if let Some(root_dir) = &request.root_dir {
    candidates.push(root_dir.join(relative));
  }
  if let Some(project_root) = &request.project_root {
    candidates.push(project_root.join(relative));
  }

  for candidate in candidates {
    if let Some(text) = read(fs, &request, &candidate).await {
      return found(&request, candidate, text);
    }
  }

  if let Some(path) = search_project(fs, &request, relative).await
    && let Some(text) = read(fs, &request, &path).await
  {
    return found(&request, path, text);
  }

  debug!(name = %request.name, "Could not resolve file requested by worker");
  Resolution {
    name: request.name,
    resolved: None,
    text: String::new(),
  }
}

fn found(request: &ResolveRequest, path: PathBuf, text: String) -> Resolution {
  debug!(name = %request.name, path = %path.display(), "Resolved file requested by worker");
  let text = if text.len() > request.max_file_size {
    String::new()
  } else {
    text
  };
  Resolution {
    name: request.name.clone(),
    resolved: Some(path),
    text,
  }
}

/// The single project file whose trailing components equal `relative`.
async fn search_project(fs: &dyn FileSystem, request: &ResolveRequest, relative: &str) -> Option<PathBuf> {
  let root = request.project_root.as_ref().or(request.root_dir.as_ref())?;
  let file_name = Path::new(relative).file_name()?.to_string_lossy().into_owned();

  let matches: Vec<PathBuf> = match fs.find_files_named(root, &file_name).await {
    Ok(files) => files.into_iter().filter(|p| p.ends_with(relative)).collect(),
    Err(e) => {
      debug!(root = %root.display(), error = %e, "Project search failed");
      return None;
    }
  };

  match matches.as_slice() {
    [only] => Some(only.clone()),
    _ => {
      trace!(name = %request.name, count = matches.len(), "Project search was not conclusive");
      None
    }
  }
}
