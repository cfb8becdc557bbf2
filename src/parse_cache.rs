//! Parse-reuse for text JSON columns.
//!
//! Within one function call, rows that repeat the previous row's text reuse
//! its parsed document instead of parsing again. Constant text columns are the
//! common case: one parse serves the whole batch.

use tracing::trace;

use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Texts handed to the parser.
    pub documents_parsed: u64,
    /// Parses that failed.
    pub malformed_documents: u64,
}

impl ParseStats {
    pub fn merge(&mut self, other: ParseStats) {
        self.documents_parsed += other.documents_parsed;
        self.malformed_documents += other.malformed_documents;
    }
}

/// Holds the most recent parse for the lifetime of one call over column `'c`.
pub struct ParseReuseCache<'c> {
    enabled: bool,
    last: Option<(&'c str, Option<Value>)>,
    stats: ParseStats,
}

impl<'c> ParseReuseCache<'c> {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last: None,
            stats: ParseStats::default(),
        }
    }

    /// Parsed document for `text`, `None` when the text is malformed.
    pub fn parse(&mut self, text: &'c str) -> Option<&Value> {
        let hit = self.enabled && self.last.as_ref().is_some_and(|(t, _)| *t == text);
        if !hit {
            self.stats.documents_parsed += 1;
            let parsed = match Value::parse(text) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.stats.malformed_documents += 1;
                    trace!(error = %e, "malformed json row, result is null");
                    None
                }
            };
            self.last = Some((text, parsed));
        }
        self.last.as_ref().and_then(|(_, parsed)| parsed.as_ref())
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}
