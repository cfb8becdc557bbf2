//! Data-parallel batch driver.
//!
//! Rows are cut into fixed-size batches and each batch runs as one fragment
//! on a rayon worker, with its own [`FragmentContext`](crate::fragment::FragmentContext).
//! Nothing is shared between batches but the immutable job description.

pub mod ndjson;

pub use ndjson::{Job, JsonFunction, process_ndjson, process_ndjson_streaming};
