//! Boundary-respecting truncation.
//!
//! A truncated segment keeps its beginning and ends at a word boundary: the
//! longest whitespace-delimited prefix that fits. Sentence terminators stay
//! attached to their word, so a run like `...` or `?!` is never split.

use ragloom_core::token::TokenEstimator;

/// Byte offsets just past each word.
fn word_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;
    for (at, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                ends.push(at);
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

/// Longest candidate prefix whose estimate is within `max_tokens`.
fn longest_fitting<'a>(
    text: &'a str,
    candidates: &[usize],
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Option<&'a str> {
    let fitting = candidates.partition_point(|&end| estimator.estimate(&text[..end]) <= max_tokens);
    let end = *candidates.get(fitting.checked_sub(1)?)?;
    let prefix = text[..end].trim_end();
    (!prefix.is_empty() && estimator.estimate(prefix) <= max_tokens).then_some(prefix)
}

/// Shorten `text` to the longest word-boundary prefix within `max_tokens`.
///
/// Returns `None` when that prefix is shorter than `min_tokens`.
pub(crate) fn truncate_to_fit<'a>(
    text: &'a str,
    max_tokens: usize,
    min_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Option<&'a str> {
    longest_fitting(text, &word_ends(text), max_tokens, estimator)
        .filter(|prefix| estimator.estimate(prefix) >= min_tokens.max(1))
}
