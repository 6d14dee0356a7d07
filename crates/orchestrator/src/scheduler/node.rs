//! Per-node runtime state.
//!
//! Each node is a small closed state machine. Every transition goes through
//! [`ExecutionNode::transition`], which rejects anything not in the table
//! below, so a bug like `Failed -> Running` surfaces as an error instead of
//! a silently corrupted run.
//!
//! | From    | To                          |
//! |---------|-----------------------------|
//! | Pending | Ready, Skipped, Failed¹     |
//! | Ready   | Running, Failed¹            |
//! | Running | Succeeded, Failed, Ready²   |
//!
//! ¹ cancellation only. ² retry after a failed attempt.

use ragloom_core::error::ToolError;
use ragloom_core::tool::{ToolInvocation, ToolOutput};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Externally visible node status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// State plus the payload that only exists in that state.
#[derive(Debug, Clone)]
pub(crate) enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded(ToolOutput),
    Failed(ToolError),
    Skipped { failed_dependency: String },
}

impl NodeState {
    fn status(&self) -> NodeStatus {
        match self {
            Self::Pending => NodeStatus::Pending,
            Self::Ready => NodeStatus::Ready,
            Self::Running => NodeStatus::Running,
            Self::Succeeded(_) => NodeStatus::Succeeded,
            Self::Failed(_) => NodeStatus::Failed,
            Self::Skipped { .. } => NodeStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal transition for node '{node}': {from} -> {to}")]
pub struct IllegalTransition {
    pub node: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
}

/// Scheduler-owned runtime record for one invocation.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionNode {
    id: String,
    state: NodeState,
    attempts: u32,
    busy: Duration,
    first_started_at: Option<Duration>,
}

impl ExecutionNode {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: NodeState::Pending,
            attempts: 0,
            busy: Duration::ZERO,
            first_started_at: None,
        }
    }

    pub(crate) fn status(&self) -> NodeStatus {
        self.state.status()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn output(&self) -> Option<&ToolOutput> {
        match &self.state {
            NodeState::Succeeded(output) => Some(output),
            _ => None,
        }
    }

    pub(crate) fn transition(&mut self, next: NodeState) -> Result<(), IllegalTransition> {
        use NodeStatus::*;
        let from = self.status();
        let to = next.status();
        let legal = matches!(
            (from, to),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Ready, Running)
                | (Ready, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Ready)
        );
        if !legal {
            return Err(IllegalTransition {
                node: self.id.clone(),
                from,
                to,
            });
        }
        if to == Running {
            self.attempts += 1;
        }
        self.state = next;
        Ok(())
    }

    /// Record one finished attempt. `started_at` is relative to the run start.
    pub(crate) fn record_attempt(&mut self, started_at: Duration, elapsed: Duration) {
        self.first_started_at.get_or_insert(started_at);
        self.busy += elapsed;
    }

    /// Undo the count for a dispatch that never reached the executor.
    pub(crate) fn discard_attempt(&mut self) {
        self.attempts = self.attempts.saturating_sub(1);
    }

    pub(crate) fn into_outcome(self, invocation: &ToolInvocation) -> NodeOutcome {
        let status = self.status();
        let (output, error, skipped_because) = match self.state {
            NodeState::Succeeded(output) => (Some(output), None, None),
            NodeState::Failed(error) => (None, Some(error), None),
            NodeState::Skipped { failed_dependency } => (None, None, Some(failed_dependency)),
            NodeState::Pending | NodeState::Ready | NodeState::Running => (None, None, None),
        };
        NodeOutcome {
            id: invocation.id.clone(),
            capability: invocation.capability.clone(),
            priority: invocation.priority,
            status,
            attempts: self.attempts,
            duration: self.busy,
            first_started_at: self.first_started_at,
            output,
            error,
            skipped_because,
        }
    }
}

/// Final state of one node after a scheduler run.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub id: String,
    pub capability: String,
    pub priority: i32,
    pub status: NodeStatus,
    pub attempts: u32,
    /// Time spent inside the executor across all attempts (backoff excluded).
    pub duration: Duration,
    /// Offset from the run start at which the first attempt began.
    pub first_started_at: Option<Duration>,
    pub output: Option<ToolOutput>,
    pub error: Option<ToolError>,
    /// For skipped nodes: the failed dependency that caused the skip.
    pub skipped_because: Option<String>,
}
