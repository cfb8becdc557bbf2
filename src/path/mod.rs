//! Path expressions: `$.k1[0].k2`, `$."k1.k2"`, `$.k1[*]`, `$.k1[1:3]`,
//! and the `$`-less simple syntax `k1.k2`.
//!
//! A path string compiles to a [`PathProgram`], an immutable token list that
//! both evaluators walk. Compiling the same string always yields the same
//! program.

mod parser;

use std::fmt;

use crate::error::JsonResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// Object member.
    Key(String),
    /// Array element, zero-based.
    Index(usize),
    /// Every array element; the rest of the program runs per element.
    Wildcard,
    /// Elements in `[start, end)`, bounds clamped to the array.
    Slice {
        start: Option<usize>,
        end: Option<usize>,
    },
}

/// A compiled path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathProgram {
    source: String,
    tokens: Vec<PathToken>,
}

impl PathProgram {
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// The path string this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// `true` for `$`: the program selects the whole document.
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The leading token when it is a `Key`.
    pub fn first_key(&self) -> Option<&str> {
        match self.tokens.first() {
            Some(PathToken::Key(name)) => Some(name),
            _ => None,
        }
    }
}

/// Compile a path string.
///
/// Errors on empty input and on malformed segments. An unmatched `]` ends
/// the path and the remainder of the string is ignored, so `$.k1[2]]]]]`
/// compiles to the same program as `$.k1[2]`.
pub fn compile(path: &str) -> JsonResult<PathProgram> {
    let tokens = parser::parse(path)?;
    Ok(PathProgram {
        source: path.to_string(),
        tokens,
    })
}

impl fmt::Display for PathProgram {
    /// Canonical `$`-rooted spelling of the program.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for token in &self.tokens {
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Key(name) if parser::needs_quotes(name) => {
                f.write_str(".\"")?;
                for c in name.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            PathToken::Key(name) => write!(f, ".{name}"),
            PathToken::Index(idx) => write!(f, "[{idx}]"),
            PathToken::Wildcard => f.write_str("[*]"),
            PathToken::Slice { start, end } => {
                f.write_str("[")?;
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                f.write_str(":")?;
                if let Some(end) = end {
                    write!(f, "{end}")?;
                }
                f.write_str("]")
            }
        }
    }
}
