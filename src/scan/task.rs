// src/scan/task.rs
// =============================================================================
// The values that flow through a scan run.
//
// - HttpMethod: which verb a probe uses
// - ScanTask: one (path, method, depth) unit of work sitting in the queue
// - ProbeOutcome: what happened when a worker probed a task
// - ProbeError: why a probe never got a status code back
//
// Everything here is plain data. Tasks are never mutated after creation;
// a worker takes one out of the queue, probes it and throws it away.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP verbs a scan can probe with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
}

impl HttpMethod {
    /// Whether a status code returned for this verb says anything about the
    /// path existing as a directory.
    ///
    /// OPTIONS and TRACE answer for the server, not for the resource, so
    /// their outcomes are never expanded.
    pub fn supports_discovery(self) -> bool {
        !matches!(self, HttpMethod::Options | HttpMethod::Trace)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Converts to the reqwest representation used by the HTTP prober.
    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    // Accepts any casing: "get", "Get" and "GET" all parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            other => Err(format!("unsupported HTTP method '{}'", other)),
        }
    }
}

/// One candidate path waiting to be probed.
///
/// `path` is already normalized and relative to the origin (no leading
/// slash). `depth` counts expansion steps from the seed entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTask {
    pub path: String,
    pub method: HttpMethod,
    pub depth: usize,
}

impl ScanTask {
    pub fn new(path: impl Into<String>, method: HttpMethod, depth: usize) -> Self {
        Self {
            path: path.into(),
            method,
            depth,
        }
    }
}

impl fmt::Display for ScanTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{} [depth {}]", self.method, self.path, self.depth)
    }
}

/// Why a probe produced no status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    /// Request timed out
    Timeout,
    /// Redirect chain longer than the configured limit
    TooManyRedirects,
    /// Could not resolve hostname
    Dns,
    /// Connection refused or reset
    Connect,
    /// SSL/TLS handshake or certificate failure
    Tls,
    /// Anything else (bad candidate URL, protocol errors, ...)
    Other,
}

/// Transport-level failure recorded on an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// The classified result of probing one task.
///
/// Exactly one of `status` and `error` is set. `expandable` is only ever
/// true for outcomes that carry a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    #[serde(flatten)] // path, method and depth sit next to the result fields in JSON
    pub task: ScanTask,
    /// Absolute URL that was requested
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Location header of an unfollowed redirect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
    pub expandable: bool,
}

impl ProbeOutcome {
    /// Outcome for a request that got a response.
    pub fn response(
        task: ScanTask,
        url: impl Into<String>,
        status: u16,
        location: Option<String>,
        expandable: bool,
    ) -> Self {
        Self {
            task,
            url: url.into(),
            status: Some(status),
            location,
            error: None,
            expandable,
        }
    }

    /// Outcome for a request that failed below HTTP.
    /// Failed probes are never expanded.
    pub fn failed(task: ScanTask, url: impl Into<String>, error: ProbeError) -> Self {
        Self {
            task,
            url: url.into(),
            status: None,
            location: None,
            error: Some(error),
            expandable: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// True when the server said the path does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}
