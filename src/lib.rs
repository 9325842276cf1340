// src/lib.rs
// =============================================================================
// dirscout: find files and directories a web server does not link to.
//
// Given a target origin and a dictionary of candidate path segments, the scan
// engine probes every candidate concurrently and keeps expanding into
// anything that looks like a directory, up to a depth limit.
//
// Modules:
// - scan: the engine (worker pool, task queue, recursion, termination)
// - dictionary: loading and generating word lists
// - output: rendering outcomes as a table, JSON or JSON lines
// - logging: tracing subscriber setup for the binary
// =============================================================================

pub mod dictionary;
pub mod logging;
pub mod output;
pub mod scan;

pub use dictionary::Dictionary;
pub use scan::{ProbeOutcome, ScanConfig, ScanError, ScanHandle, ScanSummary, Scanner};
