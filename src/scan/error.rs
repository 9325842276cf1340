// src/scan/error.rs
// =============================================================================
// Errors that stop a scan run before it starts (or kill its coordinator).
//
// Per-request failures are NOT here: those are ProbeError values carried in
// each ProbeOutcome, and the run keeps going.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target origin '{0}': a host is required")]
    InvalidOrigin(String),

    #[error("unsupported URL scheme '{0}': only http and https can be scanned")]
    UnsupportedScheme(String),

    #[error("worker pool size must be at least 1")]
    NoWorkers,

    #[error("at least one HTTP method is required")]
    NoMethods,

    #[error("invalid header '{0}': expected 'Name: value' with a legal name and value")]
    InvalidHeader(String),

    #[error("target {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("scan coordinator stopped abnormally: {0}")]
    Coordinator(#[from] tokio::task::JoinError),
}
