// src/dictionary/loader.rs
// =============================================================================
// Loads a dictionary from wherever the user points us.
//
// Sources:
// - "http://..." or "https://..." -> downloaded with reqwest
// - anything else                 -> read as a local file
//
// Format: one entry per line. Surrounding whitespace is trimmed, blank
// lines and lines starting with '#' are skipped.
// =============================================================================

use super::Dictionary;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Loads a dictionary from a file path or an http(s) URL.
///
/// Parameters:
///   source: local path or remote URL
///   timeout: used only for remote sources
pub async fn load(source: &str, timeout: Duration) -> Result<Dictionary> {
    let content = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_remote(source, timeout).await?
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("failed to read dictionary file '{}'", source))?
    };

    let dictionary = parse_lines(&content);
    info!(source, entries = dictionary.len(), "dictionary loaded");
    Ok(dictionary)
}

// Downloads a remote word list; non-2xx answers are errors
async fn fetch_remote(url: &str, timeout: Duration) -> Result<String> {
    let client = Client::builder().timeout(timeout).build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch dictionary from {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "failed to fetch dictionary from {}: HTTP {}",
            url,
            response.status().as_u16()
        ));
    }

    let body = response.text().await?;
    Ok(body)
}

/// Splits line-delimited text into dictionary entries.
pub fn parse_lines(content: &str) -> Dictionary {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
