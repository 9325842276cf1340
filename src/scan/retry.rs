// src/scan/retry.rs
// =============================================================================
// Optional retry layer around any Prober.
//
// The engine never retries on its own. When the user asks for retries, the
// HTTP prober is wrapped in a RetryingProber, which re-issues a probe that
// ended in a transport error (timeout, refused connection, ...). Responses
// with a status code, even 5xx ones, are returned as-is.
// =============================================================================

use super::error::ScanError;
use super::prober::Prober;
use super::task::{ProbeOutcome, ScanTask};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryingProber<P> {
    inner: P,
    retries: usize,
    backoff: Duration,
}

impl<P: Prober> RetryingProber<P> {
    /// `retries` extra attempts; attempt N waits `backoff * N` first.
    pub fn new(inner: P, retries: usize, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }
}

#[async_trait]
impl<P: Prober> Prober for RetryingProber<P> {
    async fn probe(&self, task: &ScanTask) -> ProbeOutcome {
        let mut outcome = self.inner.probe(task).await;

        for attempt in 1..=self.retries {
            if !outcome.is_error() {
                break;
            }

            debug!(task = %task, attempt, "retrying after transport error");
            // Linear backoff: 1x, 2x, 3x ...
            tokio::time::sleep(self.backoff * attempt as u32).await;
            outcome = self.inner.probe(task).await;
        }

        outcome
    }

    async fn preflight(&self) -> Result<(), ScanError> {
        self.inner.preflight().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::task::{HttpMethod, ProbeError, ProbeErrorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Fails the first `failures` calls, then answers 200
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for Flaky {
        async fn probe(&self, task: &ScanTask) -> ProbeOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                ProbeOutcome::failed(
                    task.clone(),
                    "http://localhost/x",
                    ProbeError::new(ProbeErrorKind::Connect, "Connection failed"),
                )
            } else {
                ProbeOutcome::response(task.clone(), "http://localhost/x", 200, None, true)
            }
        }
    }

    fn flaky(failures: usize) -> Flaky {
        Flaky {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let prober = RetryingProber::new(flaky(2), 2, Duration::from_millis(1));
        let outcome = prober.probe(&ScanTask::new("x", HttpMethod::Get, 0)).await;

        assert_eq!(outcome.status, Some(200));
        assert_eq!(prober.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let prober = RetryingProber::new(flaky(10), 2, Duration::from_millis(1));
        let outcome = prober.probe(&ScanTask::new("x", HttpMethod::Get, 0)).await;

        assert!(outcome.is_error());
        assert_eq!(prober.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_is_a_single_call() {
        let prober = RetryingProber::new(flaky(10), 0, Duration::from_millis(1));
        prober.probe(&ScanTask::new("x", HttpMethod::Get, 0)).await;

        assert_eq!(prober.inner.calls.load(Ordering::SeqCst), 1);
    }
}
