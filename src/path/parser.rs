//! Recursive descent parser for path strings.
//!
//! Grammar:
//!   path     = "$" segment* | head segment*
//!   head     = name | quoted | bracket          (simple syntax)
//!   segment  = "." name | "." quoted | "." bracket | bracket
//!   bracket  = "[" ( digits | "*" | digits? ":" digits? ) "]"
//!   quoted   = '"' ( '\' any | [^"\\] )* '"'
//!   name     = [^.\[\]"]+
//!
//! An unmatched `]` terminates the path; whatever follows it is ignored.
use super::PathToken;
use crate::error::{JsonError, JsonResult};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

pub(super) fn parse(input: &str) -> JsonResult<Vec<PathToken>> {
    if input.is_empty() {
        return Err(JsonError::syntax(input, "empty path"));
    }
    Parser::new(input).parse_path()
}

/// Whether a key must be written quoted to compile back to itself.
pub(super) fn needs_quotes(name: &str) -> bool {
    name.is_empty() || name.bytes().any(is_delimiter)
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'.' | b'[' | b']' | b'"')
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> JsonError {
        JsonError::syntax(self.input, reason)
    }

    fn parse_path(&mut self) -> JsonResult<Vec<PathToken>> {
        let mut tokens = Vec::new();

        if self.peek() == Some(b'$') {
            self.pos += 1;
        } else {
            match self.peek() {
                Some(b'.') | Some(b'[') => {}
                Some(b'"') => tokens.push(PathToken::Key(self.parse_quoted()?)),
                _ => tokens.push(PathToken::Key(self.parse_name()?)),
            }
        }

        while let Some(b) = self.peek() {
            match b {
                b'.' => {
                    self.pos += 1;
                    match self.peek() {
                        // `$.[*]` reads as `$[*]`
                        Some(b'[') => {}
                        Some(b'"') => tokens.push(PathToken::Key(self.parse_quoted()?)),
                        _ => tokens.push(PathToken::Key(self.parse_name()?)),
                    }
                }
                b'[' => tokens.push(self.parse_bracket()?),
                b']' => break,
                _ => {
                    return Err(self.error(format!(
                        "unexpected character at offset {}",
                        self.pos
                    )));
                }
            }
        }

        Ok(tokens)
    }

    // name = [^.\[\]"]+
    fn parse_name(&mut self) -> JsonResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_delimiter(b)) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected key at offset {start}")));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    // quoted = '"' ( '\' any | [^"\\] )* '"'
    fn parse_quoted(&mut self) -> JsonResult<String> {
        let open = self.pos;
        self.pos += 1;
        let mut key = String::new();
        let mut chars = self.input[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(key);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => key.push(escaped),
                    None => break,
                },
                c => key.push(c),
            }
        }
        Err(self.error(format!("unterminated quoted key at offset {open}")))
    }

    // bracket = "[" ( digits | "*" | digits? ":" digits? ) "]"
    fn parse_bracket(&mut self) -> JsonResult<PathToken> {
        let open = self.pos;
        self.pos += 1;

        let token = if self.peek() == Some(b'*') {
            self.pos += 1;
            PathToken::Wildcard
        } else {
            let start = self.parse_number()?;
            if self.peek() == Some(b':') {
                self.pos += 1;
                let end = self.parse_number()?;
                PathToken::Slice { start, end }
            } else {
                match start {
                    Some(idx) => PathToken::Index(idx),
                    None => {
                        return Err(self.error(format!(
                            "expected array index, '*' or slice at offset {}",
                            self.pos
                        )));
                    }
                }
            }
        };

        match self.peek() {
            Some(b']') => {
                self.pos += 1;
                Ok(token)
            }
            Some(_) => Err(self.error(format!(
                "unexpected character in brackets at offset {}",
                self.pos
            ))),
            None => Err(self.error(format!("unterminated '[' at offset {open}"))),
        }
    }

    fn parse_number(&mut self) -> JsonResult<Option<usize>> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        self.input[start..self.pos]
            .parse::<usize>()
            .map(Some)
            .map_err(|_| self.error(format!("array index out of range at offset {start}")))
    }
}
