//! Selection strategies (spec §4.11): choosing a winner among scored
//! candidates, across one or several objectives.
//!
//! Grounded on the teacher's `workflow.rs::calculate_assignment_score`/
//! `assign_agent_to_node`, which scores a set of candidate placements and
//! picks the best — the same "score everything, then reduce to one"
//! shape, generalized to multi-objective scores and three reduction
//! strategies instead of one fixed scoring formula.

/// A candidate scored along one or more objectives. Every score is
/// normalized so lower is better (spec §4.8), matching `Objective`.
#[derive(Debug, Clone)]
pub struct ScoredCandidate<T> {
    pub item: T,
    pub scores: Vec<f64>,
}

pub trait SelectionStrategy<T> {
    fn name(&self) -> &'static str;
    fn select<'a>(&self, candidates: &'a [ScoredCandidate<T>]) -> Option<&'a ScoredCandidate<T>>;
}

/// Picks the candidate with the lowest score on one named objective
/// index.
pub struct BestScoreSelection {
    pub objective_index: usize,
}

impl<T> SelectionStrategy<T> for BestScoreSelection {
    fn name(&self) -> &'static str {
        "best_score"
    }
    fn select<'a>(&self, candidates: &'a [ScoredCandidate<T>]) -> Option<&'a ScoredCandidate<T>> {
        candidates
            .iter()
            .filter(|c| self.objective_index < c.scores.len())
            .min_by(|a, b| {
                a.scores[self.objective_index]
                    .partial_cmp(&b.scores[self.objective_index])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Computes the Pareto-optimal front across every objective, then breaks
/// the tie among front members by the smallest sum of (unweighted)
/// scores — a Pareto front alone doesn't name a single winner, and the
/// orchestrator needs exactly one candidate to promote.
pub struct ParetoSelection;

/// Scores within this tolerance of each other count as equal rather than
/// strictly less/greater (§4.11).
const PARETO_EPSILON: f64 = 1e-4;

impl ParetoSelection {
    fn dominates(a: &[f64], b: &[f64]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| *x <= *y + PARETO_EPSILON)
            && a.iter().zip(b.iter()).any(|(x, y)| *x < *y - PARETO_EPSILON)
    }
}

impl<T> SelectionStrategy<T> for ParetoSelection {
    fn name(&self) -> &'static str {
        "pareto"
    }
    fn select<'a>(&self, candidates: &'a [ScoredCandidate<T>]) -> Option<&'a ScoredCandidate<T>> {
        if candidates.is_empty() {
            return None;
        }
        let front: Vec<&ScoredCandidate<T>> = candidates
            .iter()
            .filter(|c| !candidates.iter().any(|other| Self::dominates(&other.scores, &c.scores)))
            .collect();

        front
            .into_iter()
            .min_by(|a, b| {
                a.scores
                    .iter()
                    .sum::<f64>()
                    .partial_cmp(&b.scores.iter().sum::<f64>())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Picks the candidate with the lowest weighted sum across objectives.
pub struct WeightedBalancedSelection {
    pub weights: Vec<f64>,
}

impl WeightedBalancedSelection {
    /// `primary + Σ wᵢ·secondaryᵢ` (§4.11): the primary objective (index
    /// 0) always carries weight 1 — any weight supplied for it is
    /// ignored, only `weights[1..]` apply to the secondary objectives.
    fn weighted_score(&self, scores: &[f64]) -> f64 {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| if i == 0 { *s } else { s * self.weights.get(i).copied().unwrap_or(1.0) })
            .sum()
    }
}

impl<T> SelectionStrategy<T> for WeightedBalancedSelection {
    fn name(&self) -> &'static str {
        "weighted_balanced"
    }
    fn select<'a>(&self, candidates: &'a [ScoredCandidate<T>]) -> Option<&'a ScoredCandidate<T>> {
        candidates.iter().min_by(|a, b| {
            self.weighted_score(&a.scores)
                .partial_cmp(&self.weighted_score(&b.scores))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
