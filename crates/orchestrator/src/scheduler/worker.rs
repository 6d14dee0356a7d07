//! A single execution attempt.
//!
//! A worker sleeps through its retry backoff (if any), then drives the
//! executor under the per-node timeout. The executor call runs in its own
//! task so a panic becomes an ordinary failure and a timed-out or cancelled
//! call can be abandoned: the task is aborted at its next suspension point
//! and whatever it would have produced is discarded.

use ragloom_core::error::ToolError;
use ragloom_core::tool::{DependencyResults, ToolExecutor, ToolInvocation, ToolOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct AttemptJob {
    pub node: usize,
    pub invocation: ToolInvocation,
    pub dependencies: DependencyResults,
    pub backoff: Duration,
    pub timeout: Duration,
    pub executor: Arc<dyn ToolExecutor>,
    pub cancel: CancellationToken,
    pub run_started: Instant,
}

pub(crate) struct AttemptReport {
    pub node: usize,
    pub result: Result<ToolOutput, ToolError>,
    /// Offset from the run start at which the executor was called.
    pub started_at: Duration,
    pub elapsed: Duration,
    /// `false` when cancellation arrived during backoff, before the executor ran.
    pub executed: bool,
}

impl AttemptJob {
    pub(crate) async fn run(self) -> AttemptReport {
        let node = self.node;
        let capability = self.invocation.capability.clone();

        if !self.backoff.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return AttemptReport {
                        node,
                        result: Err(ToolError::Cancelled(capability)),
                        started_at: self.run_started.elapsed(),
                        elapsed: Duration::ZERO,
                        executed: false,
                    };
                }
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        let started = Instant::now();
        let started_at = started.duration_since(self.run_started);
        let executor = self.executor;
        let invocation = self.invocation;
        let dependencies = self.dependencies;
        let mut handle =
            tokio::spawn(async move { executor.execute(&invocation, &dependencies).await });

        let result = tokio::select! {
            joined = tokio::time::timeout(self.timeout, &mut handle) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(ToolError::failed(
                    capability.as_str(),
                    if join_err.is_panic() {
                        "executor panicked"
                    } else {
                        "executor task aborted"
                    },
                )),
                Err(_) => {
                    handle.abort();
                    Err(ToolError::Timeout {
                        capability: capability.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                }
            },
            _ = self.cancel.cancelled() => {
                handle.abort();
                Err(ToolError::Cancelled(capability.clone()))
            }
        };

        AttemptReport {
            node,
            result,
            started_at,
            elapsed: started.elapsed(),
            executed: true,
        }
    }
}
