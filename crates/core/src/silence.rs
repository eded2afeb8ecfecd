//! Silence entries: places where a run could not speak to an expectation
//! (filtered by scope, skipped by the Learner, integrity violations).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SilenceEntry {
    pub scope: String,
    pub reason: String,
    pub description: String,
}

impl SilenceEntry {
    pub fn new(scope: &str, reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            scope: scope.to_string(),
            reason: reason.into(),
            description: description.into(),
        }
    }
}

/// Sort by scope, then reason, then description using byte order, and drop
/// exact duplicates.
pub fn sort_silences(entries: &mut Vec<SilenceEntry>) {
    entries.sort();
    entries.dedup();
}
