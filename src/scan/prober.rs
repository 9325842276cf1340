// src/scan/prober.rs
// =============================================================================
// This module issues the actual HTTP requests.
//
// Key functionality:
// - Joins a task's path onto the target origin
// - Sends ONE request with the configured method, headers and timeout
// - Looks only at the status line (the body is never read)
// - Turns reqwest errors into a small set of failure kinds
//
// The engine only talks to the `Prober` trait, so tests can swap in a
// scripted prober and a retry layer can wrap the real one (see retry.rs).
//
// Rust concepts:
// - Traits: The Prober trait is the seam between the engine and the network
// - async-trait: Lets us call async trait methods through Arc<dyn Prober>
// - Result<T, E>: For setup errors; per-request errors become plain values
// =============================================================================

use super::config::{RedirectPolicy, ScanConfig, StatusSet};
use super::error::ScanError;
use super::task::{ProbeError, ProbeErrorKind, ProbeOutcome, ScanTask};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::Client;
use std::error::Error as StdError;
use tracing::debug;
use url::Url;

/// Something that can turn a ScanTask into a ProbeOutcome.
///
/// `probe` never fails: transport problems are reported inside the outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, task: &ScanTask) -> ProbeOutcome;

    /// Called once before any task is seeded. An error aborts the run.
    async fn preflight(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// The real prober, backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    base: Url,
    expandable: StatusSet,
}

impl HttpProber {
    /// Builds the HTTP client from the run configuration.
    ///
    /// The client is created once and reused for every request so
    /// connections to the target are pooled.
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        let redirect = match config.redirects {
            RedirectPolicy::DoNotFollow => reqwest::redirect::Policy::none(),
            RedirectPolicy::Follow(max) => reqwest::redirect::Policy::limited(max),
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect)
            .user_agent(config.user_agent.as_str())
            .default_headers(build_headers(&config.headers)?)
            .build()?;

        Ok(Self {
            client,
            base: config.directory_base(),
            expandable: config.expandable.clone(),
        })
    }

    // Joins a task path onto the base. The result has to stay on the base's
    // origin and under its path; nothing else is ever requested.
    fn resolve(&self, path: &str) -> Result<Url, String> {
        let url = self
            .base
            .join(path)
            .map_err(|e| format!("invalid candidate URL: {}", e))?;

        if url.origin() != self.base.origin() || !url.path().starts_with(self.base.path()) {
            return Err(format!("candidate URL {} is outside {}", url, self.base));
        }
        Ok(url)
    }

    fn analyze_response(
        &self,
        task: &ScanTask,
        url: Url,
        response: reqwest::Response,
    ) -> ProbeOutcome {
        let status = response.status();

        // Only unfollowed redirects still carry a Location header here
        let location = if status.is_redirection() {
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        } else {
            None
        };

        let expandable = self
            .expandable
            .marks_expandable(task.method, status.as_u16());

        debug!(task = %task, status = status.as_u16(), expandable, "probe answered");

        // Dropping the response here discards the body without reading it
        ProbeOutcome::response(task.clone(), url, status.as_u16(), location, expandable)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, task: &ScanTask) -> ProbeOutcome {
        let url = match self.resolve(&task.path) {
            Ok(url) => url,
            Err(message) => {
                debug!(task = %task, reason = %message, "candidate not requested");
                let attempted = format!("{}{}", self.base, task.path);
                return ProbeOutcome::failed(
                    task.clone(),
                    attempted,
                    ProbeError::new(ProbeErrorKind::Other, message),
                );
            }
        };

        let result = self
            .client
            .request(task.method.to_reqwest(), url.clone())
            .send()
            .await;

        match result {
            Ok(response) => self.analyze_response(task, url, response),
            Err(e) => {
                debug!(task = %task, error = %e, "probe failed");
                ProbeOutcome::failed(task.clone(), url, categorize_error(&e))
            }
        }
    }

    // Any status at all proves the origin answers; only transport errors fail
    async fn preflight(&self) -> Result<(), ScanError> {
        match self.client.get(self.base.clone()).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "preflight answered");
                Ok(())
            }
            Err(e) => Err(ScanError::Unreachable {
                url: self.base.to_string(),
                reason: error_chain(&e),
            }),
        }
    }
}

// Parses "Name: value" strings into a HeaderMap sent with every request
fn build_headers(raw: &[(String, String)]) -> Result<HeaderMap, ScanError> {
    let mut headers = HeaderMap::new();

    for (name, value) in raw {
        let invalid = || ScanError::InvalidHeader(format!("{}: {}", name, value));
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.append(header_name, header_value);
    }

    Ok(headers)
}

// Categorizes different error types from reqwest
//
// reqwest errors can happen for many reasons:
// - Network timeout
// - DNS resolution failure
// - SSL certificate issues
// - Too many redirects
// - etc.
//
// The interesting detail usually sits in the source chain (hyper, rustls,
// the resolver). Only the causes are matched: the top-level message holds
// the URL, and a candidate path like "/tls" must not look like a TLS error.
fn categorize_error(error: &reqwest::Error) -> ProbeError {
    let lowered = causes(error).to_lowercase();

    let kind = if error.is_timeout() {
        ProbeErrorKind::Timeout
    } else if error.is_redirect() {
        ProbeErrorKind::TooManyRedirects
    } else if lowered.contains("dns") || lowered.contains("failed to lookup") {
        ProbeErrorKind::Dns
    } else if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
        ProbeErrorKind::Tls
    } else if error.is_connect() {
        ProbeErrorKind::Connect
    } else {
        ProbeErrorKind::Other
    };

    ProbeError::new(kind, error_chain(error))
}

// "outer: inner: innermost"
fn error_chain(error: &reqwest::Error) -> String {
    let causes = causes(error);
    if causes.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", error, causes)
    }
}

fn causes(error: &reqwest::Error) -> String {
    let mut parts = Vec::new();
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
