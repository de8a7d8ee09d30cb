//! Engine run metrics.
//!
//! This module defines a small set of structs used to observe and debug
//! loading and reply-generation performance.
//!
//! The intended usage is:
//!
//! - `RiveScript::reply` / `RiveScript::load_directory` for normal operation.
//! - `RiveScript::reply_with_metrics` / `RiveScript::load_directory_with_metrics`
//!   for profiling, debugging slow loads, and the CLI's `--debug` flag.
//!
//! Metrics are intentionally simple and *opt-in*: the hot path never
//! allocates a `FileMetrics` vector or holds onto matched-pattern strings
//! unless the caller asked for them.
//!
//! ## Design notes
//!
//! - `FileMetrics` is primarily for debugging and may allocate per file.
//! - `ReplyMetrics::redirects_followed` counts `@`/`{@target}` recursions,
//!   capped the same way the matcher's own `depth` is.

use std::time::Duration;

/// Timing and counts for loading one or more source files into a brain and
/// re-sorting it (spec §4.1/§4.2/§4.3).
#[derive(Debug, Default, Clone)]
pub struct LoadMetrics {
    /// Total elapsed time for the whole load (parse + merge + sort).
    pub total: Duration,
    /// Per-file parse timing and counts, in the order files were loaded.
    pub parse: Vec<FileMetrics>,
    /// Cumulative time spent in `Brain::merge` across all files.
    pub merge: Duration,
    /// Time spent in `sorter::sort_brain`.
    pub sort: Duration,
}

/// Timing and counts for parsing a single source file.
#[derive(Debug, Default, Clone)]
pub struct FileMetrics {
    pub file: String,
    pub duration: Duration,
    pub topics_touched: usize,
    pub triggers_parsed: usize,
    pub warnings: usize,
}

/// Timing and match bookkeeping for a single `reply()` call (spec §4.5).
#[derive(Debug, Default, Clone)]
pub struct ReplyMetrics {
    /// Elapsed time for the whole `reply()` call.
    pub duration: Duration,
    /// The trigger pattern that ultimately produced the reply, if any
    /// (mirrors `session.lastMatch` after the call).
    pub matched_pattern: String,
    /// Number of redirect/BEGIN recursions followed before returning.
    pub redirects_followed: u32,
}
