//! Error types for the ragloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; the orchestrator crate
//! folds them into its top-level `OrchestrateError`.

use thiserror::Error;

// --- Graph construction ---

/// Failures while turning a tool plan into an execution graph.
///
/// Fatal to the request and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Invocation '{invocation}' depends on unknown invocation '{missing}'")]
    InvalidDependency { invocation: String, missing: String },

    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Ids on the cycle, in traversal order. The first id is repeated
        /// implicitly: `a -> b -> a` is reported as `["a", "b"]`.
        cycle: Vec<String>,
    },

    #[error("Duplicate invocation id: {0}")]
    DuplicateInvocation(String),
}

// --- Tool execution ---

/// A per-node tool failure.
///
/// Stored in the node table and the execution report, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {capability}: {reason}")]
    ExecutionFailed { capability: String, reason: String },

    #[error("Tool timed out: {capability} after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: u64 },

    #[error("Tool execution cancelled: {0}")]
    Cancelled(String),
}

impl ToolError {
    /// Convenience constructor for executor implementations.
    pub fn failed(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Cancellation is the only error class the scheduler never retries.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

// --- Context budget ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error(
        "Token budget misconfigured: total {total} - reserved output {reserved_output} \
         - reserved system {reserved_system} leaves no room for content"
    )]
    Misconfigured {
        total: usize,
        reserved_output: usize,
        reserved_system: usize,
    },
}
