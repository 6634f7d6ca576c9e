//! Run metrics.
//!
//! Collected by [`crate::parse_verbose`] for profiling grammars and spotting
//! pathological backtracking. The plain [`Parsers::parse`](super::Parsers::parse)
//! path does not fill these in.
//!
//! ```text
//! source ── compile ──> Parsers ── parse ──> tree ── bridge ──> ast
//!           (compile)              (parse)           (bridge)
//! ```

use super::parser::ParseStats;
use std::time::{Duration, Instant};

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    /// Grammar source → compiled parsers (bootstrap parse, validation, compilation).
    pub compile: Duration,
    /// Time spent in the parse call itself.
    pub parse: Duration,
    /// Concrete tree → generic AST conversion.
    pub bridge: Duration,
    /// Parser nodes entered during the parse.
    pub attempts: u64,
    /// Failed attempts recovered from by trying an alternative, stopping a
    /// repetition or ending a list.
    pub backtracks: u64,
}

impl RunMetrics {
    pub fn total(&self) -> Duration {
        self.compile + self.parse + self.bridge
    }

    pub(crate) fn record_stats(&mut self, stats: ParseStats) {
        self.attempts = stats.attempts;
        self.backtracks = stats.backtracks;
    }
}

/// Run `f`, returning its result and how long it took.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}
