//! `ragloom run`: Execute a plan file through the orchestrator.
//!
//! Tools are simulated from the plan file; everything else (graph build,
//! scheduling, retries, assembly) is the real engine. Ctrl-C cancels the run.

use super::load_config;
use super::plan_file::{PlanFile, SimulatedExecutor};
use ragloom_orchestrator::{
    CharRatioEstimator, DependencyRule, OrchestrateError, OrchestrateRequest, Orchestrator,
    OrchestratorSettings,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn run(
    config_path: Option<&Path>,
    plan_path: &Path,
    sequential: bool,
    deadline_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let mut settings = OrchestratorSettings::from_config(&config);
    if sequential {
        settings.scheduler.parallel = false;
    }
    if let Some(ms) = deadline_ms {
        settings.scheduler.run_deadline = Some(Duration::from_millis(ms));
    }

    let rules: Vec<DependencyRule> = config.dependency_rules.iter().map(DependencyRule::from).collect();
    let file = PlanFile::load(plan_path)?;
    let history = file.history.clone();
    let budget = file.budget;
    let (plan, simulations) = file.into_plan(&rules);

    let estimator = Arc::new(CharRatioEstimator::new(config.context.chars_per_token));
    let orchestrator = Orchestrator::new(
        settings,
        Arc::new(SimulatedExecutor::new(simulations)),
        estimator,
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let mut request = OrchestrateRequest::new(history, plan).with_cancellation(cancel);
    if let Some(budget) = budget {
        request = request.with_budget(budget);
    }

    match orchestrator.orchestrate(request).await {
        Ok(result) => {
            let out = serde_json::json!({
                "context": result.context.render(),
                "segments": result.context.segments,
                "report": result.report,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Err(OrchestrateError::Cancelled { reason, report }) => {
            let out = serde_json::json!({ "cancelled": reason, "report": report });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Err(format!("Run cancelled: {reason}").into())
        }
        Err(e) => Err(e.into()),
    }
}
