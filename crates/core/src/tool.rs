//! Tool invocation types and the executor contract.
//!
//! The orchestration core never knows what a tool does. Every tool is an
//! opaque `capability` invoked through one uniform [`ToolExecutor`], so adding
//! a new tool never touches the graph builder or the scheduler.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ToolError;

/// A requested unit of work within one orchestration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique within one request.
    pub id: String,

    /// Opaque identifier of the operation to perform (e.g. "search_user_documents").
    pub capability: String,

    /// Arguments passed through to the executor untouched.
    #[serde(default)]
    pub arguments: serde_json::Value,

    /// Ids of invocations whose results must exist before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Whether a failure should be retried.
    #[serde(default = "default_retryable")]
    pub retryable: bool,

    /// Tie-breaker for context assembly only; never affects scheduling.
    #[serde(default)]
    pub priority: i32,
}

fn default_retryable() -> bool {
    true
}

impl ToolInvocation {
    /// A retryable invocation with no dependencies and default priority.
    pub fn new(id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            arguments: serde_json::Value::Null,
            dependencies: Vec::new(),
            retryable: true,
            priority: 0,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// The successful result of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text content offered to the context assembler.
    pub content: String,

    /// Optional structured data for dependents (document ids, scores, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outputs of a node's succeeded dependencies, keyed by invocation id.
pub type DependencyResults = BTreeMap<String, ToolOutput>;

/// The per-tool execution contract supplied by the embedding application.
///
/// Called once per attempt. The scheduler may drop the returned future
/// (timeout or cancellation); any result arriving afterwards is discarded.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        invocation: &ToolInvocation,
        dependencies: &DependencyResults,
    ) -> Result<ToolOutput, ToolError>;
}

/// Closures returning boxed futures are executors too.
#[async_trait]
impl<F> ToolExecutor for F
where
    F: Fn(ToolInvocation, DependencyResults) -> BoxFuture<'static, Result<ToolOutput, ToolError>>
        + Send
        + Sync,
{
    async fn execute(
        &self,
        invocation: &ToolInvocation,
        dependencies: &DependencyResults,
    ) -> Result<ToolOutput, ToolError> {
        (self)(invocation.clone(), dependencies.clone()).await
    }
}
