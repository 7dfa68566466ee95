//! Bounded seeding of the worker with project files.
//!
//! After the active file is primed, the session's directory tree (and then
//! the project root, when it encloses that directory) is walked in the
//! background. Each directory's eligible files are posted back to the actor
//! as one batch; the actor applies the file-count cap and cancels the walk
//! once it is reached.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
  sync::Arc,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{message::ScopeEvent, session::SessionId};
use crate::{
  domain::config::{ExclusionPatterns, LanguageConfig},
  fs::{DirEntry, FileSystem},
};

/// Predicates deciding which files and directories take part in seeding.
#[derive(Debug, Clone)]
pub struct SeedFilter {
  pub patterns: ExclusionPatterns,
  pub language: LanguageConfig,
  /// Files excluded after timing out in the worker
  pub excluded: HashSet<PathBuf>,
  pub project_root: Option<PathBuf>,
}

impl SeedFilter {
  pub fn file_eligible(&self, entry: &DirEntry) -> bool {
    if entry.is_dir {
      return false;
    }
    let name = entry.name();
    !name.starts_with('.')
      && self.language.matches(&entry.path)
      && !self.patterns.excludes_file_name(&name)
      && !self.excluded.contains(&entry.path)
  }

  pub fn dir_eligible(&self, entry: &DirEntry) -> bool {
    if !entry.is_dir || entry.name().starts_with('.') {
      return false;
    }
    let relative = self
      .project_root
      .as_deref()
      .and_then(|root| entry.path.strip_prefix(root).ok())
      .unwrap_or(&entry.path);
    !self.patterns.excludes_directory(relative)
  }

  /// Eligible files of one listing, sorted.
  pub fn eligible_files(&self, entries: &[DirEntry]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = entries
      .iter()
      .filter(|e| self.file_eligible(e))
      .map(|e| e.path.clone())
      .collect();
    files.sort();
    files
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPhase {
  /// Subdirectories of the session's root directory
  Subdirectories,
  /// Everything under the project root outside the session's root directory
  ProjectRoot,
}

/// One background walk.
pub struct SeedWalk {
  pub session: SessionId,
  pub phase: SeedPhase,
  pub start: PathBuf,
  /// Directory already covered by the initial seed
  pub covered: PathBuf,
  pub filter: Arc<SeedFilter>,
}

impl SeedWalk {
  /// Walk depth-first, posting a [`ScopeEvent::SeedBatch`] per directory with
  /// eligible files and a [`ScopeEvent::SeedPhaseDone`] at the end.
  ///
  /// The stop token is checked before descending into each directory. Listing
  /// failures are logged and treated as empty directories.
  pub async fn run(self, fs: Arc<dyn FileSystem>, events: mpsc::Sender<ScopeEvent>, stop: CancellationToken) {
    let mut stack = vec![self.start.clone()];
    let mut batches = 0usize;

    while let Some(dir) = stack.pop() {
      if stop.is_cancelled() {
        debug!(session = self.session, phase = ?self.phase, "Seeding walk stopped");
        break;
      }

      let entries = match fs.list_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
          warn!(dir = %dir.display(), error = %e, "Failed to list directory during seeding");
          continue;
        }
      };

      if self.takes_files_from(&dir) {
        let files = self.filter.eligible_files(&entries);
        if !files.is_empty() {
          batches += 1;
          let batch = ScopeEvent::SeedBatch {
            session: self.session,
            files,
          };
          if events.send(batch).await.is_err() {
            return;
          }
        }
      }

      let mut subdirs: Vec<PathBuf> = entries
        .iter()
        .filter(|e| self.filter.dir_eligible(e) && !self.skips_subtree(&e.path))
        .map(|e| e.path.clone())
        .collect();
      subdirs.sort();
      stack.extend(subdirs.into_iter().rev());
    }

    debug!(session = self.session, phase = ?self.phase, batches, "Seeding walk finished");
    let _ = events
      .send(ScopeEvent::SeedPhaseDone {
        session: self.session,
        phase: self.phase,
      })
      .await;
  }

  fn takes_files_from(&self, dir: &Path) -> bool {
    match self.phase {
      SeedPhase::Subdirectories => dir != self.covered,
      SeedPhase::ProjectRoot => true,
    }
  }

  fn skips_subtree(&self, dir: &Path) -> bool {
    self.phase == SeedPhase::ProjectRoot && dir == self.covered
  }
}
