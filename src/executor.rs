//! Run execution (spec §4.12): actually drives one scenario through the
//! discrete-event engine to produce metrics, bounded by a concurrency
//! limit shared across every in-flight run.
//!
//! Grounded on the teacher's `workflow.rs::ExecutionEngine`, which gates
//! concurrent task execution behind a `tokio::sync::Semaphore` permit and
//! spawns each task independently. The engine itself is CPU-bound and
//! synchronous, so each run executes inside `spawn_blocking` rather than
//! being `.await`ed directly — it never yields to the runtime on its own.

use crate::engine::DiscreteEventEngine;
use crate::rng::StdSimRng;
use crate::scenario::Scenario;
use crate::{RunMetrics, SimError, SimTime};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, scenario: Scenario, horizon_ms: SimTime, seed: u64) -> Result<RunMetrics, SimError>;
}

/// Runs scenarios in-process, admitting at most `max_concurrency` at a
/// time.
pub struct InProcessExecutor {
    semaphore: Arc<Semaphore>,
}

impl InProcessExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }
}

#[async_trait]
impl RunExecutor for InProcessExecutor {
    async fn execute(&self, scenario: Scenario, horizon_ms: SimTime, seed: u64) -> Result<RunMetrics, SimError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SimError::RunFailed(format!("semaphore closed: {e}")))?;

        let result = tokio::task::spawn_blocking(move || {
            let rng = Box::new(StdSimRng::new(seed));
            let mut engine = DiscreteEventEngine::new(scenario, rng, horizon_ms)?;
            engine.schedule_workloads()?;
            engine.run()
        })
        .await
        .map_err(|e| SimError::RunFailed(format!("run task panicked: {e}")))?;

        drop(permit);
        result
    }
}
