//! Fragment-local path cache.
//!
//! The host brackets each fragment execution with [`FragmentContext::prepare`]
//! and [`FragmentContext::close`]. A constant path is compiled once in
//! `prepare` and shared by every row of every call in the fragment. A failed
//! compile is kept and replayed, so the fragment fails before any row is
//! evaluated.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::column::PathArg;
use crate::config::EngineConfig;
use crate::error::{JsonError, JsonResult};
use crate::parse_cache::ParseStats;
use crate::path::{self, PathProgram};

/// Instantiation scope of a lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionStateScope {
    /// Once per fragment: state is created and released here.
    FragmentLocal,
    /// Once per worker thread: nothing to do.
    ThreadLocal,
}

#[derive(Debug, Clone)]
enum PathState {
    Unprepared,
    /// The path varies per row.
    Variable,
    /// Constant SQL-null path: every row is null.
    NullPath,
    /// Constant empty path: nothing is ever found.
    EmptyPath,
    Compiled(Arc<PathProgram>),
    Failed(JsonError),
    Closed,
}

/// How a call resolves its path argument.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedPath<'p> {
    Null,
    NotFound,
    Program(Arc<PathProgram>),
    PerRow(&'p [Option<String>]),
}

/// State of one call site for one fragment. Owned by the fragment's single
/// worker, handed to functions by `&mut`.
#[derive(Debug)]
pub struct FragmentContext {
    config: EngineConfig,
    state: PathState,
    stats: ParseStats,
}

impl FragmentContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: PathState::Unprepared,
            stats: ParseStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub(crate) fn record(&mut self, stats: ParseStats) {
        self.stats.merge(stats);
    }

    /// The compiled constant path, when `prepare` produced one.
    pub fn program(&self) -> Option<&Arc<PathProgram>> {
        match &self.state {
            PathState::Compiled(program) => Some(program),
            _ => None,
        }
    }

    pub fn prepare(&mut self, scope: FunctionStateScope, path: &PathArg) -> JsonResult<()> {
        if scope != FunctionStateScope::FragmentLocal {
            return Ok(());
        }
        self.state = match path {
            PathArg::Column(_) => PathState::Variable,
            PathArg::Const(None) => PathState::NullPath,
            PathArg::Const(Some(p)) if p.is_empty() => PathState::EmptyPath,
            PathArg::Const(Some(p)) => match path::compile(p) {
                Ok(program) => {
                    debug!(path = %program, "compiled constant json path");
                    PathState::Compiled(Arc::new(program))
                }
                Err(e) => {
                    warn!(error = %e, "json path rejected at prepare");
                    self.state = PathState::Failed(e.clone());
                    return Err(e);
                }
            },
        };
        Ok(())
    }

    /// Release cached state. Replays a `prepare` failure; calling it again
    /// has no further effect.
    pub fn close(&mut self, scope: FunctionStateScope) -> JsonResult<()> {
        if scope != FunctionStateScope::FragmentLocal {
            return Ok(());
        }
        match &self.state {
            PathState::Failed(e) => Err(e.clone()),
            PathState::Closed => Ok(()),
            _ => {
                debug!(
                    documents_parsed = self.stats.documents_parsed,
                    malformed_documents = self.stats.malformed_documents,
                    "closing json function fragment"
                );
                self.state = PathState::Closed;
                Ok(())
            }
        }
    }

    /// Resolve the path argument of one call against the cached state.
    pub(crate) fn resolve<'p>(&self, path: &'p PathArg) -> JsonResult<ResolvedPath<'p>> {
        match (&self.state, path) {
            (PathState::Failed(e), _) => Err(e.clone()),
            (PathState::Closed, _) => Err(JsonError::InvalidArgument(
                "json function called after its fragment was closed".to_string(),
            )),
            (_, PathArg::Column(rows)) => Ok(ResolvedPath::PerRow(rows)),
            (_, PathArg::Const(None)) => Ok(ResolvedPath::Null),
            (_, PathArg::Const(Some(p))) if p.is_empty() => Ok(ResolvedPath::NotFound),
            (PathState::Compiled(program), PathArg::Const(Some(p))) if program.source() == p => {
                Ok(ResolvedPath::Program(Arc::clone(program)))
            }
            // Unprepared, or prepared for another path: compile for this call.
            (_, PathArg::Const(Some(p))) => Ok(ResolvedPath::Program(Arc::new(path::compile(p)?))),
        }
    }
}

impl Default for FragmentContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
