//! Picking video URLs out of free-form text (the input box or the clipboard).

use std::collections::HashSet;

/// Trimmed, de-duplicated lines of `text` that start with `prefix`.
///
/// Order is whatever the set yields; callers must not rely on it.
pub fn collect_urls(text: &str, prefix: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(prefix))
        .map(str::to_string)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}

/// Number of distinct accepted URLs, for the counter label.
pub fn count_urls(text: &str, prefix: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with(prefix))
        .collect::<HashSet<_>>()
        .len()
}
