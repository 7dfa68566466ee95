//! Filesystem capability consumed by seeding and file resolution.
//!
//! The orchestration core never touches the disk directly; it goes through
//! [`FileSystem`] so tests can substitute an in-memory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FsError {
  #[error("Not found: {0}")]
  NotFound(PathBuf),
  #[error("IO error on {path}: {message}")]
  Io { path: PathBuf, message: String },
  #[error("Search failed: {0}")]
  Search(String),
}

impl FsError {
  fn io(path: &Path, err: std::io::Error) -> Self {
    if err.kind() == std::io::ErrorKind::NotFound {
      FsError::NotFound(path.to_path_buf())
    } else {
      FsError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
      }
    }
  }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
  pub path: PathBuf,
  pub is_dir: bool,
}

impl DirEntry {
  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      is_dir: false,
    }
  }

  pub fn dir(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      is_dir: true,
    }
  }

  pub fn name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

#[async_trait]
pub trait FileSystem: Send + Sync {
  /// List the immediate children of `dir`.
  async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError>;

  /// Read a file as UTF-8 text.
  async fn read_text(&self, path: &Path) -> Result<String, FsError>;

  /// Every file under `root` whose final component is `file_name`.
  async fn find_files_named(&self, root: &Path, file_name: &str) -> Result<Vec<PathBuf>, FsError>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
  async fn list_dir(&self, dir: &Path) -> Result<Vec<DirEntry>, FsError> {
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(|e| FsError::io(dir, e))?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|e| FsError::io(dir, e))? {
      let is_dir = match entry.file_type().await {
        Ok(ft) => ft.is_dir(),
        Err(_) => continue,
      };
      entries.push(DirEntry {
        path: entry.path(),
        is_dir,
      });
    }
    entries.sort();
    Ok(entries)
  }

  async fn read_text(&self, path: &Path) -> Result<String, FsError> {
    tokio::fs::read_to_string(path).await.map_err(|e| FsError::io(path, e))
  }

  async fn find_files_named(&self, root: &Path, file_name: &str) -> Result<Vec<PathBuf>, FsError> {
    let root = root.to_path_buf();
    let file_name = file_name.to_string();

    tokio::task::spawn_blocking(move || {
      let mut matches = Vec::new();
      for entry in WalkBuilder::new(&root).build().flatten() {
        let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
        if is_file && entry.file_name().to_string_lossy() == file_name.as_str() {
          matches.push(entry.into_path());
        }
      }
      debug!(root = %root.display(), name = %file_name, count = matches.len(), "Project search finished");
      matches
    })
    .await
    .map_err(|e| FsError::Search(e.to_string()))
  }
}
