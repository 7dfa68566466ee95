//! Incremental buffer synchronization.
//!
//! Decides how much of the active buffer accompanies a request: nothing when
//! the worker already has the latest text, a self-contained fragment when a
//! small edit landed in a large buffer, or the whole buffer otherwise.

pub mod lexer;

use lexer::{LexState, scan_line};

use super::changes::ChangeRange;
use crate::{
  domain::{
    config::SyncConfig,
    document::{DocumentKind, DocumentSnapshot, Offset},
  },
  ipc::{FileInfo, wire_path},
};

const BOUNDARY_KEYWORD: &str = "function";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// Fragments allowed
  Incremental,
  /// Full or empty only
  NoPartial,
  /// Always the full buffer, even when unchanged
  ForceFull,
}

/// Builds the [`FileInfo`] for a request.
#[derive(Debug, Clone, Copy)]
pub struct SyncEngine<'a> {
  config: &'a SyncConfig,
  max_file_size: usize,
}

impl<'a> SyncEngine<'a> {
  pub fn new(config: &'a SyncConfig, max_file_size: usize) -> Self {
    Self { config, max_file_size }
  }

  /// Replace text over the size limit with nothing.
  pub fn filter_text(&self, text: &str) -> String {
    if text.len() > self.max_file_size {
      String::new()
    } else {
      text.to_string()
    }
  }

  pub fn file_info(
    &self,
    doc: &DocumentSnapshot,
    pending: Option<ChangeRange>,
    cursor: Offset,
    mode: SyncMode,
  ) -> FileInfo {
    let name = wire_path(&doc.path);

    if mode == SyncMode::ForceFull {
      return FileInfo::full(name, self.filter_text(&doc.text));
    }
    if doc.kind == DocumentKind::Embedded {
      return FileInfo::full(name, doc.text.to_string());
    }

    let Some(range) = pending else {
      return FileInfo::empty(name);
    };

    if mode == SyncMode::Incremental
      && doc.line_count() > self.config.large_line_count
      && range.span() < self.config.large_line_change
      && range.contains_line(cursor.line)
      && let Some(fragment) = self.fragment(doc, range)
    {
      return fragment;
    }

    FileInfo::full(name, self.filter_text(&doc.text))
  }

  /// Cut a fragment around `range` that starts at a function boundary.
  ///
  /// Returns `None` when no start line satisfies the boundary rule, in which
  /// case the caller falls back to a full sync.
  fn fragment(&self, doc: &DocumentSnapshot, range: ChangeRange) -> Option<FileInfo> {
    let lines: Vec<&str> = doc.text.split('\n').collect();
    let tab_size = self.config.tab_size;
    let window = self.config.fragment_window;

    let edit_start = (range.from as usize).min(lines.len());
    let window_start = edit_start.saturating_sub(window);

    let mut scans = Vec::with_capacity(edit_start - window_start);
    let mut state = LexState::Code;
    for line in &lines[window_start..edit_start] {
      let scan = scan_line(line, state, BOUNDARY_KEYWORD);
      state = scan.end_state;
      scans.push(scan);
    }

    // floor: smallest indentation strictly between the candidate and the edit
    let mut floor: Option<u32> = None;
    let mut boundary: Option<(usize, u32)> = None;
    for p in (window_start..edit_start).rev() {
      let Some(indent) = indentation(lines[p], tab_size) else {
        continue;
      };
      let under_floor = floor.is_none_or(|f| indent <= f);
      let shallower = boundary.is_none_or(|(_, b)| indent < b);
      if under_floor && shallower && scans[p - window_start].has_keyword {
        boundary = Some((p, indent));
      }
      floor = Some(floor.map_or(indent, |f| f.min(indent)));
    }

    let (start, boundary_indent) = match boundary {
      Some(found) => found,
      None => {
        let start_indent = lines.get(window_start).and_then(|l| indentation(l, tab_size)).unwrap_or(0);
        let between = lines
          .get(window_start + 1..edit_start)
          .unwrap_or_default()
          .iter()
          .filter_map(|l| indentation(l, tab_size))
          .min();
        if between.is_some_and(|f| start_indent > f) {
          return None;
        }
        (window_start, 0)
      }
    };

    let scan_from = (range.to as usize).min(lines.len());
    let last_line = lines.len().saturating_sub(1);
    let window_end = (scan_from + window).min(last_line);
    let mut end = window_end;
    for (l, line) in lines.iter().enumerate().take(window_end).skip(scan_from) {
      if indentation(line, tab_size).is_some_and(|indent| indent <= boundary_indent) {
        end = l + 1;
        break;
      }
    }
    let end = end.max(range.to as usize).min(lines.len());

    let text = lines[start..end].join("\n");
    Some(FileInfo::part(wire_path(&doc.path), start as u32, text))
  }
}

/// Column width of the leading whitespace, or `None` for a blank line.
pub fn indentation(line: &str, tab_size: u32) -> Option<u32> {
  if line.trim().is_empty() {
    return None;
  }
  let tab_size = tab_size.max(1);
  let mut column = 0;
  for c in line.chars() {
    match c {
      ' ' => column += 1,
      '\t' => column += tab_size - column % tab_size,
      _ => break,
    }
  }
  Some(column)
}
