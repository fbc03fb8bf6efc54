//! Convergence strategies (spec §4.10): when the optimizer should stop
//! climbing, independent of whether it's still finding improvements.
//!
//! Grounded on the teacher's `strategy.rs` tagged-enum-of-named-variants
//! shape (`OrchestrationStrategy`), generalized into a trait since each
//! convergence check reads the optimizer's score history differently
//! rather than branching on a shared enum.

/// Decides whether an optimization run has converged, given the full
/// score history so far (oldest first, lower is better). Returns whether
/// it fired and, if so, a human-readable reason naming what triggered it.
/// `min_iterations` gates every strategy: none of them can fire before the
/// history has reached that length, regardless of its own logic.
pub trait ConvergenceStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn has_converged(&self, history: &[f64]) -> (bool, String);
}

/// Stops once `patience` consecutive steps pass without a new best score.
pub struct NoImprovementStrategy {
    pub patience: usize,
    pub min_iterations: usize,
}

impl ConvergenceStrategy for NoImprovementStrategy {
    fn name(&self) -> &'static str {
        "no_improvement"
    }
    fn has_converged(&self, history: &[f64]) -> (bool, String) {
        if history.len() < self.min_iterations || history.len() <= self.patience {
            return (false, String::new());
        }
        let best_before_window = history[..history.len() - self.patience]
            .iter()
            .cloned()
            .fold(f64::MAX, f64::min);
        let window = &history[history.len() - self.patience..];
        if window.iter().all(|&s| s >= best_before_window) {
            (true, format!("no improvement in the last {} iterations", self.patience))
        } else {
            (false, String::new())
        }
    }
}

/// Stops once the spread (max - min) over the last `window` scores falls
/// under `epsilon`.
pub struct PlateauStrategy {
    pub window: usize,
    pub epsilon: f64,
    pub min_iterations: usize,
}

impl ConvergenceStrategy for PlateauStrategy {
    fn name(&self) -> &'static str {
        "plateau"
    }
    fn has_converged(&self, history: &[f64]) -> (bool, String) {
        if history.len() < self.min_iterations || history.len() < self.window {
            return (false, String::new());
        }
        let tail = &history[history.len() - self.window..];
        let max = tail.iter().cloned().fold(f64::MIN, f64::max);
        let min = tail.iter().cloned().fold(f64::MAX, f64::min);
        if (max - min) < self.epsilon {
            (true, format!("score plateaued within {} over the last {} iterations", self.epsilon, self.window))
        } else {
            (false, String::new())
        }
    }
}

/// Stops as soon as any score reaches `target` or better.
pub struct ThresholdStrategy {
    pub target: f64,
    pub min_iterations: usize,
}

impl ConvergenceStrategy for ThresholdStrategy {
    fn name(&self) -> &'static str {
        "threshold"
    }
    fn has_converged(&self, history: &[f64]) -> (bool, String) {
        if history.len() < self.min_iterations {
            return (false, String::new());
        }
        if history.iter().any(|&s| s <= self.target) {
            (true, format!("score reached target {}", self.target))
        } else {
            (false, String::new())
        }
    }
}

/// Stops once the sample variance over the last `window` scores falls
/// under `epsilon`.
pub struct VarianceStrategy {
    pub window: usize,
    pub epsilon: f64,
    pub min_iterations: usize,
}

impl ConvergenceStrategy for VarianceStrategy {
    fn name(&self) -> &'static str {
        "variance"
    }
    fn has_converged(&self, history: &[f64]) -> (bool, String) {
        if history.len() < self.min_iterations || history.len() < self.window {
            return (false, String::new());
        }
        let tail = &history[history.len() - self.window..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        let variance = tail.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / tail.len() as f64;
        if variance < self.epsilon {
            (true, format!("score variance settled under {} over the last {} iterations", self.epsilon, self.window))
        } else {
            (false, String::new())
        }
    }
}

/// Fires as soon as any one of its member strategies fires, surfacing
/// that member's own reason.
pub struct CombinedStrategy {
    pub strategies: Vec<Box<dyn ConvergenceStrategy>>,
}

impl ConvergenceStrategy for CombinedStrategy {
    fn name(&self) -> &'static str {
        "combined"
    }
    fn has_converged(&self, history: &[f64]) -> (bool, String) {
        for strategy in &self.strategies {
            let (fired, reason) = strategy.has_converged(history);
            if fired {
                return (true, reason);
            }
        }
        (false, String::new())
    }
}
