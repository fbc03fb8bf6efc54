//! Discrete-event simulator and configuration optimizer for distributed
//! service topologies.
//!
//! The crate is split into an execution substrate — event queue, resource
//! model, policy engines, workload generator, discrete-event engine,
//! metrics — and an optimization layer — objectives, explorer, convergence
//! and selection strategies, the hill-climbing optimizer, and the
//! orchestrator that binds it all to a run store and executor.

pub mod comparison;
pub mod convergence;
pub mod engine;
pub mod event_queue;
pub mod executor;
pub mod explorer;
pub mod metrics;
pub mod objectives;
pub mod optimizer;
pub mod orchestrator;
pub mod policy;
pub mod resource;
pub mod rng;
pub mod run_store;
pub mod scenario;
pub mod selection;
pub mod workload;

pub use comparison::{compare_metrics, compare_run_history, MetricsComparison, RunHistoryComparison, Trend};
pub use engine::{DiscreteEventEngine, Event, EventPayload, EventType, Request, RequestStatus};
pub use event_queue::EventQueue;
pub use executor::{InProcessExecutor, RunExecutor};
pub use explorer::{ExplorerVariant, ParameterExplorer};
pub use metrics::{MetricsCollector, RunMetrics, ServiceMetrics};
pub use objectives::{Objective, ObjectiveFactory};
pub use optimizer::{HillClimbOptimizer, OptimizationResult, OptimizationStep};
pub use orchestrator::{CandidateResult, ConfigurationCandidate, ExperimentResult, Orchestrator, OrchestratorConfig};
pub use resource::ResourceManager;
pub use rng::{SimRng, StdSimRng};
pub use run_store::{InMemoryRunStore, RunRecord, RunStatus, RunStore};
pub use scenario::{
    ArrivalPattern, AutoscalingConfig, BackoffKind, CircuitBreakerConfig, EndpointDef, Host,
    JsonScenarioCodec, PolicyConfig, RateLimitConfig, RetryConfig, Scenario, ScenarioCodec,
    ServiceDef, ServiceInstance, ServiceTimeDistribution, WorkloadSpec,
};

use thiserror::Error;

/// All errors surfaced by the core, per the error-handling design:
/// handlers inside the engine never crash the loop on these, they either
/// schedule a failure event or log and drop; everything outside the
/// engine propagates `Result` normally.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid metrics: {0}")]
    InvalidMetrics(String),

    #[error("unknown objective: {0}")]
    UnknownObjective(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("run failed: {0}")]
    RunFailed(String),

    #[error("run timed out after {0:?}")]
    RunTimeout(std::time::Duration),

    #[error("safety rail triggered: {0}")]
    SafetyRail(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Simulated time, in milliseconds since the start of a run. Distinct from
/// wall-clock time (`chrono::DateTime<Utc>`), which is used only for
/// record timestamps outside the engine's own clock.
pub type SimTime = u64;
