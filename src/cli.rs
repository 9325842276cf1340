// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Subcommands:
// - scan: probe a target with a dictionary
// - dictionary-generate: build a dictionary from a local directory tree
// - version: print the version
// =============================================================================

use clap::{ArgAction, Args, Parser, Subcommand};
use dirscout::scan::{HttpMethod, RedirectPolicy, ScanConfig, StatusSet};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

// This struct represents our entire CLI application
#[derive(Parser, Debug)]
#[command(
    name = "dirscout",
    version,
    about = "Discover files and directories a web server does not link to",
    long_about = "dirscout probes a target origin with every entry of a dictionary and \
                  recursively expands into anything that looks like a directory. \
                  It is meant for security reconnaissance of servers you are allowed to test."
)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a target origin for unlinked paths
    ///
    /// Example: dirscout scan https://example.com -d words.txt --scan-depth 2
    Scan(ScanArgs),

    /// Generate a dictionary from the files in a local directory
    ///
    /// Example: dirscout dictionary-generate ./wordpress -o words.txt
    #[command(name = "dictionary-generate", alias = "dictionary.generate")]
    DictionaryGenerate {
        /// Directory to walk
        path: PathBuf,

        /// Write the dictionary here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Emit absolute paths instead of paths relative to PATH
        #[arg(long)]
        absolute: bool,
    },

    /// Print the version
    Version,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Target origin (e.g., https://example.com or http://10.0.0.1:8080/app)
    pub url: Url,

    /// Dictionary to use: a local file or an http(s) URL, one entry per line
    #[arg(short, long)]
    pub dictionary: String,

    /// HTTP methods to probe with, comma separated
    #[arg(short = 'm', long, value_delimiter = ',', default_value = "GET")]
    pub http_methods: Vec<HttpMethod>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub http_timeout: u64,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 3)]
    pub threads: usize,

    /// How many levels to recurse into discovered directories (0 = none)
    #[arg(long, default_value_t = 3)]
    pub scan_depth: usize,

    /// User-Agent header sent with every request
    #[arg(long, default_value = concat!("dirscout/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Status codes that mark a path as a directory, e.g. "200-299,301,403"
    #[arg(long, default_value = "200-399")]
    pub expandable_status: StatusSet,

    /// Redirects to follow per request (0 = report the 3xx itself)
    #[arg(long, default_value_t = 0)]
    pub max_redirects: usize,

    /// Extra header, "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Retries for requests that fail below HTTP (timeouts, refused connections)
    #[arg(long, default_value_t = 0)]
    pub http_retries: usize,

    /// Stop the scan after this many seconds
    #[arg(long)]
    pub max_duration: Option<u64>,

    /// Check that the target answers before seeding (one extra GET)
    #[arg(long)]
    pub preflight: bool,

    /// Include 404 results in the table
    #[arg(long)]
    pub show_all: bool,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    /// Also write every outcome to this file as JSON lines
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

impl ScanArgs {
    /// Converts flags into the engine's configuration.
    ///
    /// Headers that are not "Name: value" are rejected here; header names
    /// and values the HTTP stack refuses are rejected later by the engine.
    pub fn to_config(&self) -> anyhow::Result<ScanConfig> {
        let mut config = ScanConfig::new(self.url.clone());
        config.workers = self.threads;
        config.timeout = Duration::from_millis(self.http_timeout);
        config.methods = self.http_methods.clone();
        config.user_agent = self.user_agent.clone();
        config.expandable = self.expandable_status.clone();
        config.max_depth = self.scan_depth;
        config.redirects = RedirectPolicy::from_max_redirects(self.max_redirects);
        config.retries = self.http_retries;
        config.preflight = self.preflight;
        config.headers = self
            .headers
            .iter()
            .map(|raw| parse_header(raw))
            .collect::<anyhow::Result<_>>()?;
        Ok(config)
    }
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(anyhow::anyhow!(
            "invalid header '{}': expected 'Name: value'",
            raw
        )),
    }
}
