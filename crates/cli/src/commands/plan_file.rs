//! Plan files and the simulated executor used by `run` and `validate`.
//!
//! A plan file is JSON: conversation history, an optional budget, and either
//! explicit `invocations` (each with an optional `simulate` block) or raw
//! model `tool_calls` with a `simulate` map keyed by invocation id.
//!
//! ```json
//! {
//!   "history": [{"role": "user", "content": "How did Q3 go?"}],
//!   "invocations": [
//!     {"id": "search", "capability": "search_user_documents",
//!      "simulate": {"output": "Doc 7", "delay_ms": 120, "fail_times": 1}},
//!     {"id": "load", "capability": "load_documents_full", "dependencies": ["search"]}
//!   ]
//! }
//! ```

use async_trait::async_trait;
use ragloom_orchestrator::{
    ContextBudget, DependencyResults, DependencyRule, Message, RawToolCall, ToolError,
    ToolExecutor, ToolInvocation, ToolOutput, ToolPlan,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Scripted behavior of one simulated tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Simulation {
    #[serde(default)]
    pub output: Option<String>,
    /// Fail this many attempts before succeeding.
    #[serde(default)]
    pub fail_times: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub permanent_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedInvocation {
    #[serde(flatten)]
    pub invocation: ToolInvocation,
    #[serde(default)]
    pub simulate: Option<Simulation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub budget: Option<ContextBudget>,
    #[serde(default)]
    pub invocations: Vec<PlannedInvocation>,
    #[serde(default)]
    pub tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    pub simulate: HashMap<String, Simulation>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read plan file {}: {e}", path.display()))?;
        let plan: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse plan file {}: {e}", path.display()))?;
        Ok(plan)
    }

    /// Split into the tool plan and the per-id simulations.
    ///
    /// Raw tool calls go through dependency inference and are appended after
    /// explicit invocations.
    pub fn into_plan(self, rules: &[DependencyRule]) -> (ToolPlan, HashMap<String, Simulation>) {
        let mut simulations = self.simulate;
        let mut invocations = Vec::with_capacity(self.invocations.len() + self.tool_calls.len());

        for planned in self.invocations {
            if let Some(sim) = planned.simulate {
                simulations.insert(planned.invocation.id.clone(), sim);
            }
            invocations.push(planned.invocation);
        }
        let mut plan = ToolPlan::new(invocations);
        plan.push_tool_calls(&self.tool_calls, rules, true);

        (plan, simulations)
    }
}

/// Executes invocations according to their simulation blocks.
///
/// An invocation without one succeeds immediately with a canned output.
pub struct SimulatedExecutor {
    simulations: HashMap<String, Simulation>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl SimulatedExecutor {
    pub fn new(simulations: HashMap<String, Simulation>) -> Self {
        Self {
            simulations,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn next_attempt(&self, id: &str) -> u32 {
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = attempts.entry(id.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

#[async_trait]
impl ToolExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        invocation: &ToolInvocation,
        dependencies: &DependencyResults,
    ) -> Result<ToolOutput, ToolError> {
        let sim = self
            .simulations
            .get(&invocation.id)
            .cloned()
            .unwrap_or_default();
        let attempt = self.next_attempt(&invocation.id);
        debug!(tool = %invocation.id, attempt, "Simulated tool call");

        if sim.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sim.delay_ms)).await;
        }

        if sim.permanent_failure || attempt <= sim.fail_times {
            return Err(ToolError::failed(
                invocation.capability.as_str(),
                format!("simulated failure (attempt {attempt})"),
            ));
        }

        let content = sim
            .output
            .unwrap_or_else(|| format!("{} completed", invocation.capability));
        let used: Vec<&str> = dependencies.keys().map(String::as_str).collect();
        Ok(ToolOutput::text(content).with_data(serde_json::json!({
            "attempt": attempt,
            "dependencies": used,
        })))
    }
}
