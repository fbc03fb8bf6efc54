//! Hill-climbing configuration optimizer (spec §4.10): evaluates a
//! scenario, generates neighbors, and walks toward better ones until no
//! neighbor improves or a convergence strategy fires.
//!
//! Grounded on the teacher's own `optimizer.rs` scaffold (its
//! `PerformanceOptimizer` held a config plus a learning engine that
//! updated `PerformanceHistory` per iteration) and `mcts.rs`'s
//! iterate/evaluate/update-best loop. Resolved open question: the
//! optimizer's own "no neighbor improves" check is the built-in stop
//! condition and always runs first each iteration; an attached
//! `ConvergenceStrategy` is checked only after that, so either one can
//! end the run and whichever fires first wins.

use crate::convergence::ConvergenceStrategy;
use crate::engine::DiscreteEventEngine;
use crate::explorer::ParameterExplorer;
use crate::metrics::RunMetrics;
use crate::objectives::Objective;
use crate::rng::StdSimRng;
use crate::scenario::Scenario;
use crate::{SimError, SimTime};
use tracing::{info, warn};

/// One accepted step in an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationStep {
    pub iteration: usize,
    pub scenario: Scenario,
    pub score: f64,
}

/// The outcome of a full `HillClimbOptimizer::optimize` run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best_scenario: Scenario,
    pub best_score: f64,
    pub history: Vec<OptimizationStep>,
    pub converged: bool,
    /// Why the run stopped: which stop condition fired, or a convergence
    /// strategy's own reason string (spec §4.10).
    pub reason: String,
    pub iterations: usize,
}

/// Walks a scenario's parameter space via `ParameterExplorer`, scoring
/// each candidate by running it through the discrete-event engine.
pub struct HillClimbOptimizer {
    explorer: ParameterExplorer,
    objective: Box<dyn Objective>,
    convergence: Option<Box<dyn ConvergenceStrategy>>,
    max_iterations: usize,
    horizon_ms: SimTime,
    seed: u64,
}

impl HillClimbOptimizer {
    pub fn new(
        explorer: ParameterExplorer,
        objective: Box<dyn Objective>,
        convergence: Option<Box<dyn ConvergenceStrategy>>,
        max_iterations: usize,
        horizon_ms: SimTime,
        seed: u64,
    ) -> Self {
        Self { explorer, objective, convergence, max_iterations, horizon_ms, seed }
    }

    /// Scores one scenario by running it to `horizon_ms` and feeding the
    /// resulting metrics to the configured objective.
    pub fn evaluate(&self, scenario: &Scenario) -> Result<f64, SimError> {
        self.evaluate_with_metrics(scenario).map(|(_, score)| score)
    }

    /// Like `evaluate`, but also returns the run's full metrics — used by
    /// callers (the orchestrator, in particular) that need the winning
    /// scenario's metrics as well as its score.
    pub fn evaluate_with_metrics(&self, scenario: &Scenario) -> Result<(RunMetrics, f64), SimError> {
        let rng = Box::new(StdSimRng::new(self.seed));
        let mut engine = DiscreteEventEngine::new(scenario.clone(), rng, self.horizon_ms)?;
        engine.schedule_workloads()?;
        let metrics = engine.run()?;
        let score = self.objective.score(&metrics, self.horizon_ms);
        Ok((metrics, score))
    }

    pub fn optimize(&self, initial: Scenario) -> Result<OptimizationResult, SimError> {
        let mut current_score = self.evaluate(&initial)?;
        let mut best_score = current_score;
        let mut best_scenario = initial.clone();
        let mut current = initial;
        let mut history = vec![OptimizationStep { iteration: 0, scenario: current.clone(), score: current_score }];
        let mut converged = false;
        let mut reason = String::new();
        let mut iterations_run = 0;
        let mut stall_count = 0u32;

        for iteration in 1..=self.max_iterations {
            iterations_run = iteration;
            let neighbors = self.explorer.neighbors(&current);

            if neighbors.is_empty() {
                converged = true;
                reason = "no valid neighbors".to_string();
                info!(iteration, "optimizer stopped: no valid neighbors");
                break;
            }

            let mut best_neighbor: Option<(Scenario, f64)> = None;
            for neighbor in neighbors {
                let score = match self.evaluate(&neighbor) {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(iteration, error = %e, "optimizer skipping a neighbor that failed to evaluate");
                        continue;
                    }
                };
                if best_neighbor.as_ref().map(|(_, best_score)| score < *best_score).unwrap_or(true) {
                    best_neighbor = Some((neighbor, score));
                }
            }

            let Some((neighbor, score)) = best_neighbor else {
                // Every neighbor errored out this iteration; treat it like
                // a non-improving step rather than aborting the whole run.
                stall_count += 1;
                history.push(OptimizationStep { iteration, scenario: current.clone(), score: current_score });
                if stall_count >= 3 && iteration > 3 {
                    converged = true;
                    reason = "no improvement in recent iterations".to_string();
                    break;
                }
                continue;
            };

            if score < current_score {
                current = neighbor;
                current_score = score;
                stall_count = 0;
                if current_score < best_score {
                    best_score = current_score;
                    best_scenario = current.clone();
                }
                info!(iteration, score = current_score, "optimizer accepted improving neighbor");
            } else {
                stall_count += 1;
                info!(iteration, stall_count, "optimizer stopped improving this iteration");
            }

            history.push(OptimizationStep { iteration, scenario: current.clone(), score: current_score });

            // Built-in stop condition (§4.10 step 2e): no improvement for
            // 3 consecutive iterations, only once past iteration 3.
            if stall_count >= 3 && iteration > 3 {
                converged = true;
                reason = "no improvement in recent iterations".to_string();
                info!(iteration, "optimizer stopped: no improvement in recent iterations");
                break;
            }

            if let Some(strategy) = &self.convergence {
                let scores: Vec<f64> = history.iter().map(|s| s.score).collect();
                let (fired, strategy_reason) = strategy.has_converged(&scores);
                if fired {
                    converged = true;
                    reason = strategy_reason;
                    info!(iteration, strategy = strategy.name(), reason = %reason, "optimizer stopped: convergence strategy fired");
                    break;
                }
            }
        }

        if reason.is_empty() {
            reason = "max iterations reached".to_string();
        }

        Ok(OptimizationResult {
            best_scenario,
            best_score,
            history,
            converged,
            reason,
            iterations: iterations_run,
        })
    }
}
