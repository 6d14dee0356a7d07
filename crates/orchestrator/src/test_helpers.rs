//! Scripted executor shared by the engine's unit tests.

use async_trait::async_trait;
use ragloom_core::error::ToolError;
use ragloom_core::tool::{DependencyResults, ToolExecutor, ToolInvocation, ToolOutput};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub output: String,
    pub delay: Duration,
    /// Fail this many attempts before succeeding.
    pub fail_times: u32,
    pub always_fail: bool,
}

impl Script {
    pub fn ok(output: &str, delay_ms: u64) -> Self {
        Self {
            output: output.to_string(),
            delay: Duration::from_millis(delay_ms),
            ..Default::default()
        }
    }

    pub fn flaky(output: &str, fail_times: u32) -> Self {
        Self {
            output: output.to_string(),
            fail_times,
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }
}

/// Executes invocations by id according to a script, recording what it saw.
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    attempts: Mutex<HashMap<String, u32>>,
    starts: Mutex<Vec<(String, Instant)>>,
    seen_dependencies: Mutex<HashMap<String, Vec<String>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Script)>,
    {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(id, s)| (id.to_string(), s))
                .collect(),
            attempts: Mutex::new(HashMap::new()),
            starts: Mutex::new(Vec::new()),
            seen_dependencies: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Highest number of concurrent executions observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Ids in the order their attempts started.
    pub fn start_order(&self) -> Vec<String> {
        self.starts.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn start_times(&self, id: &str) -> Vec<Instant> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == id)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Dependency ids handed to the last attempt of `id`.
    pub fn dependencies_seen(&self, id: &str) -> Vec<String> {
        self.seen_dependencies
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        invocation: &ToolInvocation,
        dependencies: &DependencyResults,
    ) -> Result<ToolOutput, ToolError> {
        let Some(script) = self.scripts.get(&invocation.id) else {
            return Err(ToolError::NotFound(invocation.capability.clone()));
        };

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(invocation.id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.starts
            .lock()
            .unwrap()
            .push((invocation.id.clone(), Instant::now()));
        self.seen_dependencies
            .lock()
            .unwrap()
            .insert(invocation.id.clone(), dependencies.keys().cloned().collect());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        if script.always_fail || attempt <= script.fail_times {
            return Err(ToolError::failed(
                invocation.capability.as_str(),
                format!("scripted failure on attempt {attempt}"),
            ));
        }
        Ok(ToolOutput::text(script.output.clone()))
    }
}
