//! Parallel, dependency-respecting tool execution.
//!
//! # Model
//!
//! One coordinator (the future returned by [`Scheduler::run`]) owns the whole
//! node table. Workers are tasks in a `JoinSet`, never more than
//! `max_workers` at once; each performs exactly one attempt and reports back.
//! Because only the coordinator mutates node state, a node is claimed by at
//! most one worker and readiness is never computed from stale state.
//!
//! # Lifecycle
//!
//! 1. Nodes with no dependencies start `Ready`; the rest stay `Pending`.
//! 2. A success decrements each dependent's unmet count; at zero it is `Ready`.
//! 3. A failed attempt is re-queued after backoff while the node is
//!    retryable and has attempts left; otherwise the node is `Failed` and
//!    every pending descendant is `Skipped`.
//! 4. The run ends when no worker is in flight and nothing is `Ready`.
//!
//! Cancellation (external token or run deadline) stops dispatch, abandons
//! in-flight attempts, and fails every non-terminal node.

mod node;
mod worker;

pub use node::{IllegalTransition, NodeOutcome, NodeStatus};

use crate::graph::ExecutionGraph;
use node::{ExecutionNode, NodeState};
use ragloom_config::OrchestratorConfig;
use ragloom_core::error::ToolError;
use ragloom_core::tool::{DependencyResults, ToolExecutor};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use worker::{AttemptJob, AttemptReport};

/// Delay policy between attempts of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    /// No delay between attempts.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            max: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * multiplier^(retry-1)`, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(retry.saturating_sub(1).min(i32::MAX as u32) as i32);
        let delay = self.initial.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(8),
        }
    }
}

/// Explicit per-run scheduling configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `false` forces one worker: fully sequential, same outcomes.
    pub parallel: bool,
    pub max_workers: usize,
    /// Retries after the first attempt, for retryable invocations.
    pub max_retries: u32,
    pub node_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Whole-run deadline, measured from the start of [`Scheduler::run`].
    pub run_deadline: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: 4,
            max_retries: 2,
            node_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            run_deadline: None,
        }
    }
}

impl From<&OrchestratorConfig> for SchedulerConfig {
    fn from(cfg: &OrchestratorConfig) -> Self {
        Self {
            parallel: cfg.parallel_execution,
            max_workers: cfg.max_workers,
            max_retries: cfg.max_tool_retries,
            node_timeout: Duration::from_millis(cfg.node_timeout_ms),
            backoff: BackoffPolicy {
                initial: Duration::from_millis(cfg.retry_backoff.initial_ms),
                multiplier: cfg.retry_backoff.multiplier,
                max: Duration::from_millis(cfg.retry_backoff.max_ms),
            },
            run_deadline: cfg.run_deadline_ms.map(Duration::from_millis),
        }
    }
}

impl SchedulerConfig {
    /// Workers actually used for a run.
    pub fn effective_workers(&self) -> usize {
        if self.parallel {
            self.max_workers.max(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("Scheduler stalled with non-terminal nodes: {}", .0.join(", "))]
    Stalled(Vec<String>),
}

/// Result of one scheduler run: every node in a terminal state.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    /// One entry per invocation, in plan order.
    pub nodes: Vec<NodeOutcome>,
    pub wall_time: Duration,
    pub workers: usize,
    /// Why the run was cut short, if it was.
    pub cancelled: Option<String>,
}

impl ScheduleOutcome {
    pub fn get(&self, id: &str) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Succeeded)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}

/// Runs execution graphs against an injected executor.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<dyn ToolExecutor>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute every node of `graph` to a terminal status.
    ///
    /// Tool failures never make this return `Err`; they are recorded per
    /// node. `Err` means the scheduler itself misbehaved.
    pub async fn run(
        &self,
        graph: &ExecutionGraph,
        cancel: &CancellationToken,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let run = RunState::new(graph, &self.config, Arc::clone(&self.executor), cancel);
        run.drive().await
    }
}

/// Coordinator state for one run. Owned by a single future; never shared.
struct RunState<'g> {
    graph: &'g ExecutionGraph,
    config: &'g SchedulerConfig,
    executor: Arc<dyn ToolExecutor>,
    token: CancellationToken,
    external: CancellationToken,
    started: Instant,
    nodes: Vec<ExecutionNode>,
    unmet: Vec<usize>,
    ready: VecDeque<(usize, Duration)>,
    in_flight: JoinSet<AttemptReport>,
    /// Node each in-flight task is working on.
    task_nodes: HashMap<Id, usize>,
    cancelled: Option<String>,
}

impl<'g> RunState<'g> {
    fn new(
        graph: &'g ExecutionGraph,
        config: &'g SchedulerConfig,
        executor: Arc<dyn ToolExecutor>,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            graph,
            config,
            executor,
            token: cancel.child_token(),
            external: cancel.clone(),
            started: Instant::now(),
            nodes: graph
                .invocations()
                .iter()
                .map(|inv| ExecutionNode::new(inv.id.as_str()))
                .collect(),
            unmet: graph.in_degrees(),
            ready: VecDeque::new(),
            in_flight: JoinSet::new(),
            task_nodes: HashMap::new(),
            cancelled: None,
        }
    }

    async fn drive(mut self) -> Result<ScheduleOutcome, SchedulerError> {
        let workers = self.config.effective_workers();
        info!(
            nodes = self.graph.len(),
            workers,
            parallel = self.config.parallel,
            "Scheduler: starting run"
        );

        for node in 0..self.graph.len() {
            if self.unmet[node] == 0 {
                self.make_ready(node, Duration::ZERO)?;
            }
        }

        let deadline = self.config.run_deadline.map(|d| self.started + d);

        loop {
            if self.cancelled.is_none() && self.external.is_cancelled() {
                self.begin_cancel("run cancelled");
            }

            if self.cancelled.is_none() {
                while self.in_flight.len() < workers {
                    let Some((node, backoff)) = self.ready.pop_front() else {
                        break;
                    };
                    self.dispatch(node, backoff)?;
                }
            }

            if self.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                joined = self.in_flight.join_next_with_id() => {
                    if let Some(joined) = joined {
                        self.handle_joined(joined)?;
                    }
                }
                _ = self.external.cancelled(), if self.cancelled.is_none() => {
                    self.begin_cancel("run cancelled");
                }
                _ = sleep_until_opt(deadline), if self.cancelled.is_none() && deadline.is_some() => {
                    self.begin_cancel("run deadline exceeded");
                }
            }
        }

        if let Some(reason) = self.cancelled.clone() {
            self.fail_remaining(&reason)?;
        }

        let stalled: Vec<String> = self
            .nodes
            .iter()
            .zip(self.graph.invocations())
            .filter(|(n, _)| !n.status().is_terminal())
            .map(|(_, inv)| inv.id.clone())
            .collect();
        if !stalled.is_empty() {
            return Err(SchedulerError::Stalled(stalled));
        }

        let wall_time = self.started.elapsed();
        let outcome = ScheduleOutcome {
            nodes: self
                .nodes
                .into_iter()
                .zip(self.graph.invocations())
                .map(|(node, inv)| node.into_outcome(inv))
                .collect(),
            wall_time,
            workers,
            cancelled: self.cancelled,
        };

        info!(
            succeeded = outcome.count(NodeStatus::Succeeded),
            failed = outcome.count(NodeStatus::Failed),
            skipped = outcome.count(NodeStatus::Skipped),
            wall_ms = wall_time.as_millis() as u64,
            "Scheduler: run finished"
        );
        Ok(outcome)
    }

    fn make_ready(&mut self, node: usize, backoff: Duration) -> Result<(), SchedulerError> {
        self.nodes[node].transition(NodeState::Ready)?;
        self.ready.push_back((node, backoff));
        debug!(tool = %self.graph.node(node).id, "Scheduler: node ready");
        Ok(())
    }

    fn dispatch(&mut self, node: usize, backoff: Duration) -> Result<(), SchedulerError> {
        self.nodes[node].transition(NodeState::Running)?;

        let invocation = self.graph.node(node).clone();
        let dependencies: DependencyResults = self
            .graph
            .dependencies(node)
            .iter()
            .filter_map(|&dep| {
                self.nodes[dep]
                    .output()
                    .map(|out| (self.graph.node(dep).id.clone(), out.clone()))
            })
            .collect();

        debug!(
            tool = %invocation.id,
            capability = %invocation.capability,
            attempt = self.nodes[node].attempts(),
            backoff_ms = backoff.as_millis() as u64,
            "Scheduler: node started"
        );

        let job = AttemptJob {
            node,
            invocation,
            dependencies,
            backoff,
            timeout: self.config.node_timeout,
            executor: Arc::clone(&self.executor),
            cancel: self.token.clone(),
            run_started: self.started,
        };
        let task = self.in_flight.spawn(job.run());
        self.task_nodes.insert(task.id(), node);
        Ok(())
    }

    fn handle_joined(
        &mut self,
        joined: Result<(Id, AttemptReport), JoinError>,
    ) -> Result<(), SchedulerError> {
        let join_err = match joined {
            Ok((task, report)) => {
                self.task_nodes.remove(&task);
                return self.handle_report(report);
            }
            Err(join_err) => join_err,
        };

        // Executor panics are caught inside the worker; this is the worker itself.
        let Some(node) = self.task_nodes.remove(&join_err.id()) else {
            error!(error = %join_err, "Scheduler: unknown worker task failed");
            return Ok(());
        };
        let graph = self.graph;
        let invocation = graph.node(node);
        error!(tool = %invocation.id, error = %join_err, "Scheduler: worker task failed");

        let err = ToolError::failed(invocation.capability.as_str(), "worker task failed");
        self.nodes[node].transition(NodeState::Failed(err))?;
        self.skip_descendants(node)
    }

    fn handle_report(&mut self, report: AttemptReport) -> Result<(), SchedulerError> {
        let node = report.node;
        if report.executed {
            self.nodes[node].record_attempt(report.started_at, report.elapsed);
        } else {
            self.nodes[node].discard_attempt();
        }

        // Anything arriving after cancellation is abandoned work.
        if let Some(reason) = &self.cancelled {
            let err = ToolError::Cancelled(reason.clone());
            self.nodes[node].transition(NodeState::Failed(err))?;
            return Ok(());
        }

        let graph = self.graph;
        let invocation = graph.node(node);
        match report.result {
            Ok(output) => {
                info!(
                    tool = %invocation.id,
                    attempt = self.nodes[node].attempts(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Scheduler: node succeeded"
                );
                self.nodes[node].transition(NodeState::Succeeded(output))?;

                for &dependent in graph.dependents(node) {
                    self.unmet[dependent] -= 1;
                    if self.unmet[dependent] == 0
                        && self.nodes[dependent].status() == NodeStatus::Pending
                    {
                        self.make_ready(dependent, Duration::ZERO)?;
                    }
                }
            }
            Err(err) => {
                let attempts = self.nodes[node].attempts();
                let can_retry = invocation.retryable
                    && !err.is_cancellation()
                    && attempts <= self.config.max_retries;

                if can_retry {
                    let backoff = self.config.backoff.delay_for_retry(attempts);
                    warn!(
                        tool = %invocation.id,
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Scheduler: attempt failed, retrying"
                    );
                    self.make_ready(node, backoff)?;
                } else {
                    error!(
                        tool = %invocation.id,
                        attempts,
                        error = %err,
                        "Scheduler: node failed"
                    );
                    self.nodes[node].transition(NodeState::Failed(err))?;
                    self.skip_descendants(node)?;
                }
            }
        }
        Ok(())
    }

    /// Mark every pending descendant of a failed node as skipped.
    fn skip_descendants(&mut self, failed: usize) -> Result<(), SchedulerError> {
        let failed_id = self.graph.node(failed).id.clone();
        let mut stack: Vec<usize> = self.graph.dependents(failed).to_vec();

        while let Some(node) = stack.pop() {
            if self.nodes[node].status() != NodeStatus::Pending {
                continue;
            }
            self.nodes[node].transition(NodeState::Skipped {
                failed_dependency: failed_id.clone(),
            })?;
            warn!(
                tool = %self.graph.node(node).id,
                failed_dependency = %failed_id,
                "Scheduler: node skipped"
            );
            stack.extend_from_slice(self.graph.dependents(node));
        }
        Ok(())
    }

    fn begin_cancel(&mut self, reason: &str) {
        warn!(
            reason,
            in_flight = self.in_flight.len(),
            queued = self.ready.len(),
            "Scheduler: cancellation observed"
        );
        self.cancelled = Some(reason.to_string());
        self.token.cancel();
    }

    fn fail_remaining(&mut self, reason: &str) -> Result<(), SchedulerError> {
        self.ready.clear();
        for node in &mut self.nodes {
            if !node.status().is_terminal() {
                node.transition(NodeState::Failed(ToolError::Cancelled(reason.to_string())))?;
            }
        }
        Ok(())
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
