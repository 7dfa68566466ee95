//! Host-side document types
//!
//! The editor owns its buffers. This crate only ever sees immutable snapshots
//! handed over at the interaction points (activation, requests), plus the raw
//! change lists produced by each edit.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::{Deserialize, Serialize};

/// A zero-based buffer position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset {
  pub line: u32,
  pub ch: u32,
}

impl Offset {
  /// Start of the buffer. Used as the offset for file-level requests
  /// (priming, updates) that have no cursor.
  pub const ZERO: Offset = Offset { line: 0, ch: 0 };

  pub fn new(line: u32, ch: u32) -> Self {
    Self { line, ch }
  }
}

/// How the buffer text relates to the script text the worker analyzes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentKind {
  /// The buffer is the script.
  #[default]
  Script,
  /// The script is embedded in another format (e.g. markup). The snapshot
  /// text is the extracted script text, recomputed wholesale on every change.
  Embedded,
}

/// Immutable view of an editor document at one point in time.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
  /// Absolute path of the backing file
  pub path: PathBuf,
  /// Full text (for [`DocumentKind::Embedded`], the effective script text)
  pub text: Arc<str>,
  pub kind: DocumentKind,
  /// Whether the document has no backing file on disk
  pub untitled: bool,
  /// Whether the document has unsaved modifications
  pub dirty: bool,
}

impl DocumentSnapshot {
  pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
    Self {
      path: path.into(),
      text: text.into(),
      kind: DocumentKind::Script,
      untitled: false,
      dirty: false,
    }
  }

  pub fn embedded(mut self) -> Self {
    self.kind = DocumentKind::Embedded;
    self
  }

  pub fn untitled(mut self) -> Self {
    self.untitled = true;
    self
  }

  pub fn with_dirty(mut self, dirty: bool) -> Self {
    self.dirty = dirty;
    self
  }

  /// Directory containing the document, if it has one.
  pub fn dir(&self) -> Option<&Path> {
    self.path.parent()
  }

  pub fn line_count(&self) -> usize {
    self.text.split('\n').count()
  }
}

/// A single edit as reported by the editor.
///
/// `from..to` is the replaced span in pre-edit coordinates; `text` holds the
/// inserted lines (an insertion without newlines is a single element, a pure
/// deletion is `[""]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditChange {
  pub from: Offset,
  pub to: Offset,
  pub text: Vec<String>,
}

impl EditChange {
  pub fn new(from: Offset, to: Offset, text: &str) -> Self {
    Self {
      from,
      to,
      text: text.split('\n').map(str::to_string).collect(),
    }
  }

  /// Last line touched by the inserted text, in post-edit coordinates.
  pub fn end_line(&self) -> u32 {
    self.from.line + (self.text.len().max(1) as u32 - 1)
  }
}
