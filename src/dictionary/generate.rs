// src/dictionary/generate.rs
// =============================================================================
// Bootstraps a dictionary from a local directory tree.
//
// Useful when you have a copy of (or something similar to) the software the
// target runs: every file and directory name in the tree becomes a
// candidate path.
// =============================================================================

use super::Dictionary;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Walks `root` and returns every entry below it, sorted.
///
/// Paths are relative to `root` and '/'-separated unless `absolute` is set.
/// The root itself is not included.
pub fn generate(root: &Path, absolute: bool) -> Result<Dictionary> {
    if !root.is_dir() {
        return Err(anyhow!(
            "unable to use the provided path {}: not an existing directory",
            root.display()
        ));
    }

    let base = if absolute {
        root.canonicalize()
            .with_context(|| format!("unable to use the provided path {}", root.display()))?
    } else {
        root.to_path_buf()
    };

    let mut entries = Vec::new();
    for entry in WalkDir::new(&base).min_depth(1) {
        let entry =
            entry.with_context(|| format!("unable to use the provided path {}", root.display()))?;

        let path = if absolute {
            entry.path().to_path_buf()
        } else {
            entry.path().strip_prefix(&base)?.to_path_buf()
        };

        let rendered: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .filter(|c| c != "/")
            .collect();

        let joined = rendered.join("/");
        entries.push(if absolute { format!("/{}", joined) } else { joined });
    }

    entries.sort();
    entries.dedup();
    Ok(Dictionary::new(entries))
}
