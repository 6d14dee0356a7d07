//! Token estimation contract.
//!
//! The downstream model's exact tokenizer is not required: an approximate,
//! per-model estimator is configured by the embedding application. The
//! heuristic default lives in the orchestrator crate.

/// Maps text to an approximate token count.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Plain functions and closures are estimators.
impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, text: &str) -> usize {
        (self)(text)
    }
}
