//! `ragloom validate`: Build a plan file's execution graph.

use super::load_config;
use super::plan_file::PlanFile;
use ragloom_orchestrator::{DependencyRule, ExecutionGraph};
use std::path::Path;

pub async fn run(config_path: Option<&Path>, plan_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let rules: Vec<DependencyRule> = config.dependency_rules.iter().map(DependencyRule::from).collect();
    let (plan, _) = PlanFile::load(plan_path)?.into_plan(&rules);

    println!("🔍 Validating {}...", plan_path.display());
    match ExecutionGraph::build(plan.invocations) {
        Ok(graph) => {
            println!("   ✅ {} tools, acyclic", graph.len());
            for (level, ids) in graph.levels().iter().enumerate() {
                println!("   Level {level}: {}", ids.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            println!("   ❌ {e}");
            Err(e.into())
        }
    }
}
