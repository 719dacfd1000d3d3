//! Panel Lookup Library
//!
//! Compacts long-format regional panel data into sparse per-granularity JSON
//! lookups and answers dashboard queries over them.
//!
//! Module organization:
//! - `lookup`: row reading, time axis, compaction, field statistics, queries
//! - `present`: color scales, palettes, exports, measure-info labels
//! - `artifacts`: manifest types and the cached artifact loader
//! - `config`: build and view configuration from dashboard properties
//! - `pipeline`: the end-to-end build
//! - `memprof`: memory and timing checkpoints

pub mod artifacts;
pub mod config;
pub mod lookup;
pub mod memprof;
pub mod pipeline;
pub mod present;
