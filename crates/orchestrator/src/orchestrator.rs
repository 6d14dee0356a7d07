//! Composition root: Graph Builder → Scheduler → Context Assembler.
//!
//! No algorithm of its own. Graph and budget errors reject the request
//! before any tool runs; per-tool failures are folded into the report and
//! the context is assembled from whatever succeeded. Neither the graph build
//! nor the assembly is ever retried: both are deterministic.

use crate::context::{
    AssembledContext, AssemblyPolicy, ContextAssembler, ContextBudget, ToolResult,
};
use crate::graph::ExecutionGraph;
use crate::plan::ToolPlan;
use crate::report::ExecutionReport;
use crate::scheduler::{NodeOutcome, Scheduler, SchedulerConfig, SchedulerError};
use ragloom_config::AppConfig;
use ragloom_core::error::{BudgetError, GraphError};
use ragloom_core::message::Message;
use ragloom_core::token::TokenEstimator;
use ragloom_core::tool::ToolExecutor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Explicit runtime configuration for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub scheduler: SchedulerConfig,
    /// Used when a request carries no budget of its own.
    pub budget: ContextBudget,
    pub assembly: AssemblyPolicy,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scheduler: SchedulerConfig::from(&config.orchestrator),
            budget: ContextBudget::from(&config.context),
            assembly: AssemblyPolicy::from(&config.context),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One orchestration call.
#[derive(Debug, Clone)]
pub struct OrchestrateRequest {
    /// Oldest → newest.
    pub history: Vec<Message>,
    pub plan: ToolPlan,
    pub budget: Option<ContextBudget>,
    pub cancel: CancellationToken,
}

impl OrchestrateRequest {
    pub fn new(history: Vec<Message>, plan: ToolPlan) -> Self {
        Self {
            history,
            plan,
            budget: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Orchestration {
    pub context: AssembledContext,
    pub report: ExecutionReport,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("Invalid tool plan: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    /// Cancelled or past the run deadline. The partial report is kept so no
    /// per-node error is lost.
    #[error("Orchestration cancelled: {reason}")]
    Cancelled {
        reason: String,
        report: Box<ExecutionReport>,
    },

    #[error("Internal orchestrator error: {0}")]
    Internal(String),
}

impl From<SchedulerError> for OrchestrateError {
    fn from(e: SchedulerError) -> Self {
        Self::Internal(e.to_string())
    }
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    scheduler: Scheduler,
    assembler: ContextAssembler,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        executor: Arc<dyn ToolExecutor>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(settings.scheduler.clone(), executor),
            assembler: ContextAssembler::new(settings.assembly.clone(), estimator),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run the plan and assemble the context for the next model call.
    pub async fn orchestrate(
        &self,
        request: OrchestrateRequest,
    ) -> Result<Orchestration, OrchestrateError> {
        let OrchestrateRequest {
            history,
            plan,
            budget,
            cancel,
        } = request;
        let budget = budget.unwrap_or(self.settings.budget);

        info!(
            tools = plan.invocations.len(),
            history_turns = history.len(),
            "Orchestrator: request received"
        );

        let graph = ExecutionGraph::build(plan.invocations)?;
        budget.available_for_content()?;

        let outcome = self.scheduler.run(&graph, &cancel).await?;
        let mut report = ExecutionReport::from_outcome(&outcome, self.settings.scheduler.parallel);

        if let Some(reason) = outcome.cancelled {
            warn!(reason = %reason, failed = report.failed, "Orchestrator: run cancelled");
            return Err(OrchestrateError::Cancelled {
                reason,
                report: Box::new(report),
            });
        }

        if !report.all_succeeded() {
            warn!(
                failed = report.failed,
                skipped = report.skipped,
                "Orchestrator: proceeding with partial tool results"
            );
        }

        let results: Vec<ToolResult> = outcome.succeeded().filter_map(tool_result).collect();
        let context = self.assembler.assemble(&history, &results, &budget)?;
        report.assembly = Some(context.metadata.clone());

        Ok(Orchestration { context, report })
    }
}

fn tool_result(node: &NodeOutcome) -> Option<ToolResult> {
    let output = node.output.as_ref()?;
    Some(
        ToolResult::new(node.id.as_str(), node.capability.as_str(), output.content.as_str())
            .with_priority(node.priority),
    )
}
