//! Heuristic token estimation.
//!
//! Character-ratio heuristic: ~4 characters per token for mixed text.
//! Counts Unicode scalar values rather than bytes, so Cyrillic or CJK
//! history is not overestimated two- to three-fold.

use ragloom_core::token::TokenEstimator;

/// `ceil(chars / chars_per_token)`. Empty text is zero tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharRatioEstimator {
    chars_per_token: f32,
}

impl CharRatioEstimator {
    /// Non-positive or non-finite ratios fall back to the default of 4.
    pub fn new(chars_per_token: f32) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            4.0
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f32 {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        (chars / f64::from(self.chars_per_token)).ceil() as usize
    }
}
