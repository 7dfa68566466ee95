//! Running span of lines touched since the last buffer sync.

use crate::domain::document::EditChange;

/// Lines `from..to` of the active buffer that changed since the last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRange {
  pub from: u32,
  pub to: u32,
}

impl ChangeRange {
  pub fn new(from: u32, to: u32) -> Self {
    Self { from, to }
  }

  pub fn span(&self) -> u32 {
    self.to.saturating_sub(self.from)
  }

  pub fn contains_line(&self, line: u32) -> bool {
    self.from <= line && line < self.to
  }
}

/// Accumulates edits into a single [`ChangeRange`].
#[derive(Debug, Default)]
pub struct ChangeTracker {
  range: Option<ChangeRange>,
}

impl ChangeTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Merge one editor change event into the running range.
  pub fn track(&mut self, changes: &[EditChange]) {
    let Some(first) = changes.first() else {
      return;
    };

    let (mut from, mut to) = match self.range {
      Some(range) => (i64::from(range.from), i64::from(range.to)),
      None => (i64::from(first.from.line), i64::from(first.from.line)),
    };

    for change in changes {
      let start = i64::from(change.from.line);
      let end = i64::from(change.end_line());

      // An edit above the end shifts it by the net line delta
      if start < to {
        to -= i64::from(change.to.line) - end;
      }
      if end >= to {
        to = end + 1;
      }
      if from > start {
        from = start;
      }
    }

    let from = from.max(0);
    let to = to.max(from);
    self.range = Some(ChangeRange::new(from as u32, to as u32));
  }

  pub fn pending(&self) -> Option<ChangeRange> {
    self.range
  }

  /// Consume the backlog.
  pub fn take(&mut self) -> Option<ChangeRange> {
    self.range.take()
  }

  pub fn clear(&mut self) {
    self.range = None;
  }
}
