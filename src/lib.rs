pub mod column;
pub mod config;
pub mod error;
pub mod eval;
pub mod flat_eval;
pub mod flat_value;
pub mod fragment;
pub mod functions;
pub mod output;
pub mod parallel;
pub mod parse_cache;
pub mod path;
pub mod value;

pub use column::{Arg, Column, CompositeColumn, Datum, JsonColumn, PathArg};
pub use config::EngineConfig;
pub use error::{JsonError, JsonResult};
pub use fragment::{FragmentContext, FunctionStateScope};
pub use path::{PathProgram, PathToken, compile};
pub use value::Value;

pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Strip UTF-8 BOM (U+FEFF, bytes EF BB BF) from the beginning of a buffer.
pub fn strip_bom(buf: &mut Vec<u8>) {
    if buf.starts_with(UTF8_BOM) {
        buf.drain(..UTF8_BOM.len());
    }
}
