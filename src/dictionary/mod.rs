// src/dictionary/mod.rs
// =============================================================================
// This module owns the word list ("dictionary") a scan is driven by.
//
// Submodules:
// - loader: reads a dictionary from a local file or a remote URL
// - generate: builds a dictionary by walking a local directory tree
//
// The scan engine only ever sees the finished `Dictionary` value and never
// knows where it came from.
// =============================================================================

mod generate;
mod loader;

use serde::{Deserialize, Serialize};

pub use generate::generate;
pub use loader::{load, parse_lines};

/// Ordered list of candidate path segments. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: Vec<String>,
}

impl Dictionary {
    /// Keeps the order given and drops blank entries.
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .filter(|e| !e.trim().is_empty())
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<String>> for Dictionary {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<String> for Dictionary {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter)
    }
}
