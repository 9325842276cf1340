// src/scan/policy.rs
// =============================================================================
// Decides which tasks exist: the seeds, and the children of every outcome
// that looks like a directory.
//
// Rules:
// - Seeds: one task per (dictionary entry, method) at depth 0
// - Children: only for expandable outcomes below the depth limit,
//   one per dictionary entry, same method as the parent
// - Every candidate path is normalized before use
// - A (method, path) pair is handed out at most once per run
//
// Expansion never recurses: children are returned to the caller, which
// pushes them onto the queue with depth carried as data.
// =============================================================================

use super::task::{HttpMethod, ProbeOutcome, ScanTask};
use crate::dictionary::Dictionary;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Paths already handed out during this run.
///
/// Keyed by method as well, so `GET /a` and `POST /a` are separate probes.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: Mutex<HashSet<(HttpMethod, String)>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the pair as visited. Returns false if it already was.
    ///
    /// Check and insert happen under one lock, so two workers racing on the
    /// same path cannot both win.
    pub fn insert(&self, method: HttpMethod, path: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method, path.to_string()))
    }

    #[cfg(test)]
    fn contains(&self, method: HttpMethod, path: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(method, path.to_string()))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Joins `entry` onto `parent` and normalizes the result.
///
/// Segments are read the way a URL parser reads them, so what is checked
/// here is what gets requested:
/// - `\` separates segments like `/`, and tabs and newlines are ignored
/// - `.` and `..` match case-insensitively, also as `%2e`
/// - empty and `.` segments are dropped (`a//b/./c` -> `a/b/c`)
/// - `..` removes the previous segment of the entry, but may never climb
///   into or above `parent`
/// - a `?query` or `#fragment` on the entry is kept verbatim at the end
///
/// Returns `None` for candidates that escape, end up empty, hang off a
/// parent that itself has a query or fragment, or start with a `name:`
/// segment (which a URL parser takes as a scheme).
pub fn normalize_path(parent: &str, entry: &str) -> Option<String> {
    if parent.contains(['?', '#']) {
        return None;
    }

    let entry: String = entry
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let (entry_path, suffix) = match entry.find(['?', '#']) {
        Some(idx) => entry.split_at(idx),
        None => (entry.as_str(), ""),
    };

    let mut segments: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();
    let floor = segments.len();

    for segment in entry_path.split(['/', '\\']) {
        match dot_segment(segment) {
            Some(Dots::Current) => {}
            Some(Dots::Parent) => {
                if segments.len() == floor {
                    return None;
                }
                segments.pop();
            }
            None => segments.push(segment),
        }
    }

    // Nothing new was added: the candidate is the parent itself
    if segments.len() == floor && suffix.is_empty() {
        return None;
    }

    if segments.first().is_some_and(|first| first.contains(':')) {
        return None;
    }

    Some(format!("{}{}", segments.join("/"), suffix))
}

enum Dots {
    Current,
    Parent,
}

// "", ".", "%2e" and "..", ".%2E", "%2e%2e" etc.
fn dot_segment(segment: &str) -> Option<Dots> {
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "" | "." => Some(Dots::Current),
        ".." => Some(Dots::Parent),
        _ => None,
    }
}

/// Seeding and expansion rules for one run.
#[derive(Debug, Clone)]
pub struct RecursionPolicy {
    dictionary: Dictionary,
    max_depth: usize,
}

impl RecursionPolicy {
    pub fn new(dictionary: Dictionary, max_depth: usize) -> Self {
        Self {
            dictionary,
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Depth-0 tasks: every entry once per method, duplicates dropped.
    pub fn seed(&self, methods: &[HttpMethod], visited: &VisitedSet) -> Vec<ScanTask> {
        let mut tasks = Vec::new();
        for &method in methods {
            tasks.extend(self.candidates("", method, 0, visited));
        }
        tasks
    }

    /// Children of an outcome, or nothing if it is not a directory or is
    /// already at the depth limit.
    pub fn expand(&self, outcome: &ProbeOutcome, visited: &VisitedSet) -> Vec<ScanTask> {
        let task = &outcome.task;
        if !outcome.expandable || task.depth >= self.max_depth {
            return Vec::new();
        }

        self.candidates(&task.path, task.method, task.depth + 1, visited)
    }

    fn candidates(
        &self,
        parent: &str,
        method: HttpMethod,
        depth: usize,
        visited: &VisitedSet,
    ) -> Vec<ScanTask> {
        self.dictionary
            .iter()
            .filter_map(|entry| normalize_path(parent, entry))
            .filter(|path| visited.insert(method, path))
            .map(|path| ScanTask::new(path, method, depth))
            .collect()
    }
}
