// Diff statistics between successive document versions

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

/// Word-level change summary of a refinement step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Number of inserted words
    pub additions: usize,
    /// Number of removed words
    pub deletions: usize,
    /// (added chars + removed chars) / max(1, new length in chars)
    pub change_ratio: f64,
}

impl DiffStats {
    pub fn is_unchanged(&self) -> bool {
        self.additions == 0 && self.deletions == 0 && self.change_ratio == 0.0
    }
}

/// Compare two versions of a text word by word.
///
/// Whitespace runs count toward the changed length but not toward the
/// word counts, so `change_ratio` is zero exactly when the texts are equal.
pub fn diff_stats(old: &str, new: &str) -> DiffStats {
    if old == new {
        return DiffStats::default();
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_words(old, new);

    let mut stats = DiffStats::default();
    let mut added_len = 0usize;
    let mut removed_len = 0usize;

    for change in diff.iter_all_changes() {
        let value = change.value();
        let is_word = !value.trim().is_empty();
        match change.tag() {
            ChangeTag::Insert => {
                added_len += value.chars().count();
                if is_word {
                    stats.additions += 1;
                }
            }
            ChangeTag::Delete => {
                removed_len += value.chars().count();
                if is_word {
                    stats.deletions += 1;
                }
            }
            ChangeTag::Equal => {}
        }
    }

    let new_len = new.chars().count().max(1);
    stats.change_ratio = (added_len + removed_len) as f64 / new_len as f64;
    stats
}
