//! # ragloom Orchestrator
//!
//! The orchestration core of a conversational retrieval agent. Given a
//! tool plan decided upstream and the conversation history, it:
//!
//! 1. validates the plan into an acyclic [`ExecutionGraph`],
//! 2. runs independent tools concurrently on a bounded worker pool with
//!    retries, timeouts, and cancellation ([`Scheduler`]),
//! 3. packs tool results and history into a token-bounded context
//!    ([`ContextAssembler`]).
//!
//! [`Orchestrator`] sequences the three. Tool execution and token counting
//! are injected collaborators ([`ToolExecutor`], [`TokenEstimator`]).
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ragloom_orchestrator::*;
//! # async fn demo(executor: Arc<dyn ToolExecutor>) -> Result<(), OrchestrateError> {
//! let orchestrator = Orchestrator::new(
//!     OrchestratorSettings::default(),
//!     executor,
//!     Arc::new(CharRatioEstimator::default()),
//! );
//! let plan = ToolPlan::new(vec![
//!     ToolInvocation::new("search", "search_user_documents"),
//!     ToolInvocation::new("load", "load_documents_full").depends_on(["search"]),
//! ]);
//! let result = orchestrator
//!     .orchestrate(OrchestrateRequest::new(vec![Message::user("Summarize Q3")], plan))
//!     .await?;
//! println!("{}", result.context.render());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod graph;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod scheduler;

#[cfg(test)]
mod test_helpers;

pub use context::{
    AssembledContext, AssemblyMetadata, AssemblyMode, AssemblyPolicy, CharRatioEstimator,
    ContextAssembler, ContextBudget, ContextSegment, SegmentSource, ToolResult,
};
pub use graph::ExecutionGraph;
pub use orchestrator::{
    OrchestrateError, OrchestrateRequest, Orchestration, Orchestrator, OrchestratorSettings,
};
pub use plan::{DependencyRule, RawToolCall, ToolPlan};
pub use report::{ExecutionReport, NodeReport};
pub use scheduler::{
    BackoffPolicy, NodeOutcome, NodeStatus, ScheduleOutcome, Scheduler, SchedulerConfig,
    SchedulerError,
};

pub use ragloom_core::{
    BudgetError, DependencyResults, GraphError, Message, Role, TokenEstimator, ToolError,
    ToolExecutor, ToolInvocation, ToolOutput,
};
