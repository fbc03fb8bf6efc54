//! Exercises the optimization layer end to end: exploring neighbors,
//! scoring them under several objectives, selecting a winner, and
//! comparing the result against a baseline run — the same path an
//! external caller drives through `Orchestrator` one level up.

use std::sync::Arc;
use topology_sim::{
    compare_metrics, ArrivalPattern, CandidateResult, EndpointDef, ExplorerVariant, Host,
    HillClimbOptimizer, InMemoryRunStore, InProcessExecutor, Objective, ObjectiveFactory,
    Orchestrator, OrchestratorConfig, ParameterExplorer, Scenario, ServiceDef,
    ServiceTimeDistribution, WorkloadSpec,
};
use topology_sim::orchestrator::ConfigurationCandidate;
use topology_sim::selection::{ParetoSelection, ScoredCandidate, SelectionStrategy};

fn base_scenario(replicas: usize) -> Scenario {
    Scenario {
        hosts: vec![Host { id: "h1".into(), cpu_cores: 8.0, memory_capacity_mb: 8192.0 }],
        services: vec![ServiceDef {
            name: "svc".into(),
            replicas,
            cpu_cores: 1.0,
            memory_mb: 256.0,
            endpoints: vec![EndpointDef {
                path: "/x".into(),
                service_time: ServiceTimeDistribution::Constant { ms: 6.0 },
                downstream: vec![],
            }],
            autoscaling: None,
            retry: None,
            min_replicas: 1,
            max_replicas: 8,
        }],
        workload: vec![WorkloadSpec {
            target: "svc:/x".into(),
            pattern: ArrivalPattern::Constant { rate_rps: 25.0 },
            start_ms: 0,
            end_ms: 2_000,
        }],
        policies: None,
    }
}

#[test]
fn exploring_then_selecting_picks_a_pareto_optimal_neighbor() {
    let scenario = base_scenario(2);
    let explorer = ParameterExplorer::new(ExplorerVariant::Default);
    let latency = ObjectiveFactory::build("p95_latency").unwrap();
    let cost = ObjectiveFactory::build("cost").unwrap();

    let candidates: Vec<ScoredCandidate<Scenario>> = explorer
        .neighbors(&scenario)
        .into_iter()
        .map(|n| {
            let mut engine = topology_sim::DiscreteEventEngine::new(
                n.clone(),
                Box::new(topology_sim::StdSimRng::new(3)),
                2_000,
            )
            .unwrap();
            engine.schedule_workloads().unwrap();
            let metrics = engine.run().unwrap();
            let scores = vec![latency.score(&metrics, 2_000), cost.score(&metrics, 2_000)];
            ScoredCandidate { item: n, scores }
        })
        .collect();

    let winner = ParetoSelection.select(&candidates);
    assert!(winner.is_some());
}

#[tokio::test]
async fn orchestrator_evaluates_a_batch_of_candidates_and_the_result_compares_favorably() {
    let store = Arc::new(InMemoryRunStore::new());
    let executor = Arc::new(InProcessExecutor::new(4));
    let orchestrator = Orchestrator::new(
        store,
        executor,
        OrchestratorConfig { run_timeout_ms: 5_000, horizon_ms: 2_000, seed: 5 },
    );

    let candidates = vec![
        ConfigurationCandidate { id: "small".into(), scenario: base_scenario(1) },
        ConfigurationCandidate { id: "large".into(), scenario: base_scenario(4) },
    ];

    let results: Vec<CandidateResult> = orchestrator.evaluate_configurations_parallel(candidates).await;
    assert_eq!(results.len(), 2);
    let small = results.iter().find(|r| r.candidate_id == "small").unwrap();
    let large = results.iter().find(|r| r.candidate_id == "large").unwrap();
    assert!(small.metrics.is_some());
    assert!(large.metrics.is_some());

    let objective = ObjectiveFactory::build("p95_latency").unwrap();
    let cmp = compare_metrics(objective.as_ref(), small.metrics.as_ref().unwrap(), large.metrics.as_ref().unwrap(), 2_000);
    // More replicas should never make worst-case latency higher under
    // otherwise identical load.
    assert!(cmp.p95_diff <= 0.0);
}

#[tokio::test]
async fn run_experiment_drives_the_optimizer_and_persists_its_history() {
    let store = Arc::new(InMemoryRunStore::new());
    let executor = Arc::new(InProcessExecutor::new(4));
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        executor,
        OrchestratorConfig { run_timeout_ms: 5_000, horizon_ms: 2_000, seed: 5 },
    ));

    let optimizer = Arc::new(HillClimbOptimizer::new(
        ParameterExplorer::new(ExplorerVariant::Default),
        ObjectiveFactory::build("p95_latency").unwrap(),
        None,
        4,
        2_000,
        5,
    ));

    let result = orchestrator.run_experiment(optimizer, base_scenario(2)).await.unwrap();
    assert!(!result.runs.is_empty());
    assert!(!result.best_run_id.is_empty());
    assert!(!result.reason.is_empty());
    assert!(result.best_score.is_finite());
}
