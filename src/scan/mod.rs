// src/scan/mod.rs
// =============================================================================
// The scan engine.
//
// Submodules:
// - task: ScanTask / ProbeOutcome and friends (plain data)
// - config: ScanConfig and the expandable-status policy
// - error: setup errors that abort a run
// - prober: the Prober trait and the reqwest-backed HttpProber
// - retry: optional retry wrapper around any Prober
// - queue: closable task queue shared by the workers
// - policy: seeding, expansion, path normalization, de-duplication
// - engine: the coordinator, worker pool and result stream
//
// Typical use:
//   let scanner = Scanner::with_http(config, dictionary)?;
//   let mut handle = scanner.start(cancel_token).await?;
//   while let Some(outcome) = handle.next().await { ... }
// =============================================================================

mod config;
mod engine;
mod error;
mod policy;
mod prober;
mod queue;
mod retry;
mod task;

pub use config::{RedirectPolicy, ScanConfig, StatusSet};
pub use engine::{ScanHandle, ScanPhase, ScanSummary, Scanner};
pub use error::ScanError;
pub use policy::normalize_path;
pub use prober::{HttpProber, Prober};
pub use retry::RetryingProber;
pub use task::{HttpMethod, ProbeError, ProbeErrorKind, ProbeOutcome, ScanTask};
