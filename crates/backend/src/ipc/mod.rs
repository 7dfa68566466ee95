//! Worker wire protocol
//!
//! Every message crossing the worker boundary is a JSON object tagged by
//! `type`. Requests flow host → worker, events flow worker → host. Events
//! answering a correlated request echo the request's file and offset.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::document::Offset;

// ============================================================================
// Request kinds and sync payloads
// ============================================================================

/// The kind half of a request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
  Completions,
  CalledFunctionType,
  GetGuesses,
  JumpToDef,
  ScopeData,
  FindRefs,
  PrimePump,
  UpdateFile,
}

impl RequestKind {
  /// Guess-style requests resolve to an empty result when the worker reports
  /// an error; everything else is rejected.
  pub fn is_guess(self) -> bool {
    matches!(self, Self::GetGuesses)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileInfoKind {
  /// Whole buffer
  Full,
  /// Self-contained fragment starting at `offset_lines`
  Part,
  /// Buffer unchanged since the last sync
  Empty,
}

/// Buffer snapshot attached to every analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
  #[serde(rename = "type")]
  pub kind: FileInfoKind,
  pub name: String,
  pub offset_lines: u32,
  pub text: String,
}

impl FileInfo {
  pub fn full(name: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      kind: FileInfoKind::Full,
      name: name.into(),
      offset_lines: 0,
      text: text.into(),
    }
  }

  pub fn part(name: impl Into<String>, offset_lines: u32, text: impl Into<String>) -> Self {
    Self {
      kind: FileInfoKind::Part,
      name: name.into(),
      offset_lines,
      text: text.into(),
    }
  }

  pub fn empty(name: impl Into<String>) -> Self {
    Self {
      kind: FileInfoKind::Empty,
      name: name.into(),
      offset_lines: 0,
      text: String::new(),
    }
  }

  /// Translate a buffer position into the coordinates of this payload.
  pub fn worker_offset(&self, cursor: Offset) -> Offset {
    match self.kind {
      FileInfoKind::Part => Offset::new(cursor.line.saturating_sub(self.offset_lines), cursor.ch),
      _ => cursor,
    }
  }
}

/// Path as it appears on the wire.
pub fn wire_path(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

// ============================================================================
// Host → worker
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
  SetConfig {
    config: Value,
  },
  Reset,
  Init {
    dir: String,
    files: Vec<String>,
    env: Vec<Value>,
    timeout: u64,
  },
  AddFiles {
    files: Vec<String>,
  },
  UpdateFile {
    path: String,
    text: String,
  },
  PrimePump {
    path: String,
    is_untitled: bool,
  },
  /// Reply to a worker-initiated [`WorkerEvent::GetFile`]
  GetFile {
    file: String,
    text: String,
  },
  Completions {
    file_info: FileInfo,
    offset: Offset,
    is_property: bool,
  },
  CalledFunctionType {
    file_info: FileInfo,
    offset: Offset,
  },
  GetGuesses {
    file_info: FileInfo,
    offset: Offset,
  },
  JumpToDef {
    file_info: FileInfo,
    offset: Offset,
  },
  ScopeData {
    file_info: FileInfo,
    offset: Offset,
  },
  FindRefs {
    file_info: FileInfo,
    offset: Offset,
  },
  UpdateDirtyFile {
    name: String,
    action: bool,
  },
  ClearDirtyFiles,
}

impl WorkerRequest {
  /// Build the analysis request for `kind` carrying `file_info`.
  ///
  /// Returns `None` for the file-level kinds, which are not built from a
  /// cursor position.
  pub fn analysis(kind: RequestKind, file_info: FileInfo, offset: Offset, is_property: bool) -> Option<Self> {
    let request = match kind {
      RequestKind::Completions => Self::Completions {
        file_info,
        offset,
        is_property,
      },
      RequestKind::CalledFunctionType => Self::CalledFunctionType { file_info, offset },
      RequestKind::GetGuesses => Self::GetGuesses { file_info, offset },
      RequestKind::JumpToDef => Self::JumpToDef { file_info, offset },
      RequestKind::ScopeData => Self::ScopeData { file_info, offset },
      RequestKind::FindRefs => Self::FindRefs { file_info, offset },
      RequestKind::PrimePump | RequestKind::UpdateFile => return None,
    };
    Some(request)
  }

  /// Short name for logging.
  pub fn name(&self) -> &'static str {
    match self {
      Self::SetConfig { .. } => "SET_CONFIG",
      Self::Reset => "RESET",
      Self::Init { .. } => "INIT",
      Self::AddFiles { .. } => "ADD_FILES",
      Self::UpdateFile { .. } => "UPDATE_FILE",
      Self::PrimePump { .. } => "PRIME_PUMP",
      Self::GetFile { .. } => "GET_FILE",
      Self::Completions { .. } => "COMPLETIONS",
      Self::CalledFunctionType { .. } => "CALLED_FUNCTION_TYPE",
      Self::GetGuesses { .. } => "GET_GUESSES",
      Self::JumpToDef { .. } => "JUMP_TO_DEF",
      Self::ScopeData { .. } => "SCOPE_DATA",
      Self::FindRefs { .. } => "FIND_REFS",
      Self::UpdateDirtyFile { .. } => "UPDATE_DIRTY_FILE",
      Self::ClearDirtyFiles => "CLEAR_DIRTY_FILES",
    }
  }
}

// ============================================================================
// Worker → host
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
  pub value: String,
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub depth: Option<u32>,
  pub guess: Option<bool>,
  pub doc: Option<String>,
  pub url: Option<String>,
  pub origin: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum WorkerEvent {
  /// The worker finished (re)starting and accepts messages
  WorkerReady,
  Completions {
    file: String,
    offset: Offset,
    completions: Option<Vec<Completion>>,
    properties: Option<Vec<String>>,
    error: Option<String>,
  },
  CalledFunctionType {
    file: String,
    offset: Offset,
    fn_type: Option<Value>,
    error: Option<String>,
  },
  GetGuesses {
    file: String,
    offset: Offset,
    properties: Option<Vec<String>>,
    error: Option<String>,
  },
  JumpToDef {
    file: String,
    offset: Offset,
    result_file: Option<String>,
    start: Option<Offset>,
    end: Option<Offset>,
    error: Option<String>,
  },
  ScopeData {
    file: String,
    offset: Offset,
    scope: Option<Value>,
    error: Option<String>,
  },
  FindRefs {
    file: String,
    offset: Offset,
    references: Option<Value>,
    error: Option<String>,
  },
  PrimePump {
    path: String,
  },
  UpdateFile {
    path: String,
  },
  /// The worker wants the contents of a file it discovered
  GetFile {
    file: String,
  },
  InferenceTimedOut {
    file: String,
  },
}

impl WorkerEvent {
  /// Identity of the request this event answers, if it answers one.
  pub fn answers(&self) -> Option<(&str, Offset, RequestKind)> {
    let answered = match self {
      Self::Completions { file, offset, .. } => (file.as_str(), *offset, RequestKind::Completions),
      Self::CalledFunctionType { file, offset, .. } => (file.as_str(), *offset, RequestKind::CalledFunctionType),
      Self::GetGuesses { file, offset, .. } => (file.as_str(), *offset, RequestKind::GetGuesses),
      Self::JumpToDef { file, offset, .. } => (file.as_str(), *offset, RequestKind::JumpToDef),
      Self::ScopeData { file, offset, .. } => (file.as_str(), *offset, RequestKind::ScopeData),
      Self::FindRefs { file, offset, .. } => (file.as_str(), *offset, RequestKind::FindRefs),
      Self::PrimePump { path } => (path.as_str(), Offset::ZERO, RequestKind::PrimePump),
      Self::UpdateFile { path } => (path.as_str(), Offset::ZERO, RequestKind::UpdateFile),
      Self::WorkerReady | Self::GetFile { .. } | Self::InferenceTimedOut { .. } => return None,
    };
    Some(answered)
  }

  /// Convert a correlated response into the value handed to waiters.
  ///
  /// `Err` carries the worker-reported error text.
  pub fn into_reply(self) -> Result<WorkerReply, String> {
    match self {
      Self::Completions {
        completions,
        properties,
        error,
        ..
      } => {
        if let Some(error) = error {
          return Err(error);
        }
        let completions = match (completions, properties) {
          (Some(hints), _) => Completions::Hints(hints),
          (None, Some(properties)) => Completions::Properties(properties),
          (None, None) => Completions::Hints(Vec::new()),
        };
        Ok(WorkerReply::Completions(completions))
      }
      Self::CalledFunctionType { fn_type, error, .. } => match error {
        Some(error) => Err(error),
        None => Ok(WorkerReply::FunctionType(fn_type.unwrap_or(Value::Null))),
      },
      Self::GetGuesses { properties, error, .. } => match error {
        Some(error) => Err(error),
        None => Ok(WorkerReply::Guesses(properties.unwrap_or_default())),
      },
      Self::JumpToDef {
        result_file,
        start,
        end,
        error,
        ..
      } => match error {
        Some(error) => Err(error),
        None => Ok(WorkerReply::Definition(DefinitionLocation {
          result_file,
          full_path: None,
          start,
          end,
        })),
      },
      Self::ScopeData { scope, error, .. } => match error {
        Some(error) => Err(error),
        None => Ok(WorkerReply::Scope(scope.unwrap_or(Value::Null))),
      },
      Self::FindRefs { references, error, .. } => match error {
        Some(error) => Err(error),
        None => Ok(WorkerReply::References(references.unwrap_or(Value::Null))),
      },
      Self::PrimePump { .. } => Ok(WorkerReply::Primed),
      Self::UpdateFile { .. } => Ok(WorkerReply::Updated),
      Self::WorkerReady | Self::GetFile { .. } | Self::InferenceTimedOut { .. } => {
        Err("event does not answer a request".to_string())
      }
    }
  }
}

// ============================================================================
// Replies handed to callers
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Completions {
  /// Identifier or property completions
  Hints(Vec<Completion>),
  /// No completions; the worker offered property names to guess from
  Properties(Vec<String>),
}

impl Completions {
  pub fn is_empty(&self) -> bool {
    match self {
      Self::Hints(hints) => hints.is_empty(),
      Self::Properties(properties) => properties.is_empty(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionLocation {
  /// File name as reported by the worker
  pub result_file: Option<String>,
  /// Absolute path the host resolved `result_file` to, if it did
  pub full_path: Option<PathBuf>,
  pub start: Option<Offset>,
  pub end: Option<Offset>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
  Completions(Completions),
  FunctionType(Value),
  Guesses(Vec<String>),
  Definition(DefinitionLocation),
  Scope(Value),
  References(Value),
  Primed,
  Updated,
}

impl WorkerReply {
  /// Empty result for guess-style requests whose response carried an error.
  pub fn empty_for(kind: RequestKind) -> Option<Self> {
    kind.is_guess().then(|| Self::Guesses(Vec::new()))
  }
}
