// src/scan/config.rs
// =============================================================================
// Run configuration for the scan engine.
//
// A ScanConfig is built once (usually from CLI flags) and stays fixed for the
// whole run. Scanner::new validates it before anything touches the network.
//
// StatusSet is the "which status codes look like a directory" policy. It is
// always supplied by the caller; the engine has no built-in opinion beyond
// the default the CLI passes in.
// =============================================================================

use super::error::ScanError;
use super::task::HttpMethod;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// A set of HTTP status codes, stored as inclusive ranges.
///
/// Parses from a comma separated list where each item is either a single
/// code or a `low-high` range: `"200-299,301,403"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    ranges: Vec<(u16, u16)>,
}

impl StatusSet {
    pub fn from_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ranges: codes.into_iter().map(|c| (c, c)).collect(),
        }
    }

    pub fn from_range(low: u16, high: u16) -> Self {
        Self {
            ranges: vec![(low.min(high), low.max(high))],
        }
    }

    pub fn contains(&self, status: u16) -> bool {
        self.ranges
            .iter()
            .any(|&(low, high)| (low..=high).contains(&status))
    }

    /// Whether a response with `status` to a request using `method` should
    /// be treated as a directory and expanded.
    pub fn marks_expandable(&self, method: HttpMethod, status: u16) -> bool {
        method.supports_discovery() && self.contains(status)
    }
}

impl Default for StatusSet {
    /// 2xx and 3xx
    fn default() -> Self {
        Self::from_range(200, 399)
    }
}

impl FromStr for StatusSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ranges = Vec::new();

        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (low, high) = match item.split_once('-') {
                Some((low, high)) => (parse_code(low)?, parse_code(high)?),
                None => {
                    let code = parse_code(item)?;
                    (code, code)
                }
            };

            if low > high {
                return Err(format!("status range '{}' is reversed", item));
            }
            ranges.push((low, high));
        }

        Ok(Self { ranges })
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|&(low, high)| {
                if low == high {
                    low.to_string()
                } else {
                    format!("{}-{}", low, high)
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

fn parse_code(raw: &str) -> Result<u16, String> {
    let code: u16 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a status code", raw.trim()))?;

    if !(100..=599).contains(&code) {
        return Err(format!("status code {} is outside 100-599", code));
    }
    Ok(code)
}

/// What the HTTP prober does with 3xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Report the 3xx status itself (and its Location header)
    DoNotFollow,
    /// Follow up to this many hops and report the final status
    Follow(usize),
}

impl RedirectPolicy {
    /// 0 means "do not follow", which is how the CLI flag reads.
    pub fn from_max_redirects(max: usize) -> Self {
        if max == 0 {
            RedirectPolicy::DoNotFollow
        } else {
            RedirectPolicy::Follow(max)
        }
    }
}

/// Everything a scan run needs besides the dictionary and the prober.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Origin every candidate path is joined onto
    pub base_url: Url,
    /// Number of concurrent workers (max in-flight requests)
    pub workers: usize,
    /// Per-request timeout
    pub timeout: Duration,
    /// Each dictionary entry is seeded once per method
    pub methods: Vec<HttpMethod>,
    pub user_agent: String,
    /// Extra headers sent with every probe
    pub headers: Vec<(String, String)>,
    pub expandable: StatusSet,
    /// Tasks deeper than this are never created
    pub max_depth: usize,
    pub redirects: RedirectPolicy,
    /// Times a transport error is retried by the HTTP stack (0 = never)
    pub retries: usize,
    /// Probe the origin once before seeding. Off by default: it is one
    /// extra request beyond the dictionary.
    pub preflight: bool,
}

impl ScanConfig {
    /// Defaults mirror the CLI defaults.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            workers: 3,
            timeout: Duration::from_millis(5000),
            methods: vec![HttpMethod::Get],
            user_agent: format!("dirscout/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
            expandable: StatusSet::default(),
            max_depth: 3,
            redirects: RedirectPolicy::DoNotFollow,
            retries: 0,
            preflight: false,
        }
    }

    /// Fails fast on settings that make a run meaningless.
    pub fn validate(&self) -> Result<(), ScanError> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => return Err(ScanError::UnsupportedScheme(other.to_string())),
        }

        if self.base_url.host_str().map_or(true, str::is_empty) {
            return Err(ScanError::InvalidOrigin(self.base_url.to_string()));
        }

        if self.workers == 0 {
            return Err(ScanError::NoWorkers);
        }

        if self.methods.is_empty() {
            return Err(ScanError::NoMethods);
        }

        Ok(())
    }

    /// The origin with a trailing slash, so `Url::join` keeps any base path.
    ///
    /// `http://host/app` joined with `admin` would otherwise give
    /// `http://host/admin`.
    pub fn directory_base(&self) -> Url {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        base
    }
}
