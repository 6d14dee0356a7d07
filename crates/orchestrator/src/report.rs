//! Execution report returned alongside the assembled context.

use crate::context::AssemblyMetadata;
use crate::scheduler::{NodeOutcome, NodeStatus, ScheduleOutcome};
use serde::Serialize;

/// Per-node result summary. Every failure keeps its error message.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: String,
    pub capability: String,
    pub status: NodeStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_because: Option<String>,
}

impl From<&NodeOutcome> for NodeReport {
    fn from(node: &NodeOutcome) -> Self {
        Self {
            id: node.id.clone(),
            capability: node.capability.clone(),
            status: node.status,
            attempts: node.attempts,
            duration_ms: node.duration.as_millis() as u64,
            started_at_ms: node.first_started_at.map(|d| d.as_millis() as u64),
            error: node.error.as_ref().map(ToString::to_string),
            skipped_because: node.skipped_because.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Plan order.
    pub nodes: Vec<NodeReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub wall_time_ms: u64,
    pub parallel: bool,
    pub workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
    /// Absent when the run was cancelled before assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly: Option<AssemblyMetadata>,
}

impl ExecutionReport {
    pub fn from_outcome(outcome: &ScheduleOutcome, parallel: bool) -> Self {
        Self {
            nodes: outcome.nodes.iter().map(NodeReport::from).collect(),
            succeeded: outcome.count(NodeStatus::Succeeded),
            failed: outcome.count(NodeStatus::Failed),
            skipped: outcome.count(NodeStatus::Skipped),
            wall_time_ms: outcome.wall_time.as_millis() as u64,
            parallel,
            workers: outcome.workers,
            cancelled: outcome.cancelled.clone(),
            assembly: None,
        }
    }

    /// True when every tool succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Failed)
    }
}
