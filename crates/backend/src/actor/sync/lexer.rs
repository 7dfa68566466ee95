//! Just enough of a script lexer to tell a keyword from the same word inside
//! a string, a comment, or a property name.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LexState {
  #[default]
  Code,
  BlockComment,
  Template,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineScan {
  /// `keyword` occurs on the line as a keyword token
  pub has_keyword: bool,
  /// Lexer state carried into the next line
  pub end_state: LexState,
}

fn is_ident_start(c: char) -> bool {
  c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
  c.is_alphanumeric() || c == '_' || c == '$'
}

/// Scan one line starting in `state`.
pub fn scan_line(line: &str, state: LexState, keyword: &str) -> LineScan {
  let chars: Vec<char> = line.chars().collect();
  let mut state = state;
  let mut has_keyword = false;
  let mut prev: Option<char> = None;
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    let next = chars.get(i + 1).copied();

    match state {
      LexState::BlockComment => {
        if c == '*' && next == Some('/') {
          state = LexState::Code;
          i += 2;
        } else {
          i += 1;
        }
      }
      LexState::Template => {
        if c == '\\' {
          i += 2;
        } else {
          if c == '`' {
            state = LexState::Code;
            prev = Some(c);
          }
          i += 1;
        }
      }
      LexState::Code => {
        if c == '/' && next == Some('/') {
          break;
        }
        if c == '/' && next == Some('*') {
          state = LexState::BlockComment;
          i += 2;
          continue;
        }
        if c == '`' {
          state = LexState::Template;
          i += 1;
          continue;
        }
        if c == '"' || c == '\'' {
          i += 1;
          while i < chars.len() && chars[i] != c {
            if chars[i] == '\\' {
              i += 1;
            }
            i += 1;
          }
          i += 1;
          prev = Some(c);
          continue;
        }
        if is_ident_start(c) || c.is_ascii_digit() {
          let start = i;
          while i < chars.len() && is_ident_part(chars[i]) {
            i += 1;
          }
          let word: String = chars[start..i].iter().collect();
          if word == keyword && prev != Some('.') {
            has_keyword = true;
          }
          prev = chars.get(i - 1).copied();
          continue;
        }
        if !c.is_whitespace() {
          prev = Some(c);
        }
        i += 1;
      }
    }
  }

  LineScan {
    has_keyword,
    end_state: state,
  }
}
