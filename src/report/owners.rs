use std::collections::{HashMap, HashSet};

use crate::github::OwnershipHit;

/// Lines starting with this marker (after whitespace) are comments.
pub const COMMENT_MARKER: char = '#';

/// Strip comments and blank lines from a code owners file.
///
/// Kept lines are trimmed and joined with `\n`; the result has no trailing
/// newline.
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the first hit per repository, in search order.
pub fn first_per_repository(hits: Vec<OwnershipHit>) -> Vec<OwnershipHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.repository.clone()))
        .collect()
}

/// Repository name to normalized code owners text.
#[derive(Debug, Clone, Default)]
pub struct OwnershipMap {
    owners: HashMap<String, String>,
}

impl OwnershipMap {
    /// Record `text` for `repository` unless it already has an entry.
    pub fn insert(&mut self, repository: &str, text: &str) {
        self.owners
            .entry(repository.to_string())
            .or_insert_with(|| normalize(text));
    }

    pub fn get(&self, repository: &str) -> Option<&str> {
        self.owners.get(repository).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
