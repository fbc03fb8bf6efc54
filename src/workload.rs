//! Workload generation (spec §4.4): arrival processes that schedule
//! request arrivals against a `target`, plus a secondary user-flow
//! generator for multi-step traces that share one `trace_id`.
//!
//! Grounded on the teacher's `mcts.rs`, which draws its exploration noise
//! straight off `rand::Rng` inside a bounded simulation loop; the same
//! bounded-loop-with-an-explicit-safety-rail shape is used here for the
//! bursty pattern, whose on/off cycle has no natural termination condition
//! of its own.

use crate::rng::SimRng;
use crate::scenario::{ArrivalPattern, WorkloadSpec};
use crate::{SimError, SimTime};

/// Hard cap on inter-arrival draws per workload, guarding against a
/// pathological rate (near zero) looping forever inside `[start_ms,
/// end_ms)`.
const MAX_ARRIVALS_PER_WORKLOAD: usize = 100_000;

/// Expand one `WorkloadSpec` into the absolute arrival times it
/// generates within `[start_ms, end_ms)`. A non-positive rate is a
/// configuration error, not a silent empty workload.
pub fn generate_arrivals(spec: &WorkloadSpec, rng: &mut dyn SimRng) -> Result<Vec<SimTime>, SimError> {
    if let ArrivalPattern::Uniform { rate_rps } = &spec.pattern {
        return generate_uniform_arrivals(spec, *rate_rps, rng);
    }

    let mut arrivals = Vec::new();
    let mut t = spec.start_ms;
    let mut burst_phase_until = spec.start_ms;
    let mut in_burst = true;

    while t < spec.end_ms {
        if arrivals.len() >= MAX_ARRIVALS_PER_WORKLOAD {
            return Err(SimError::SafetyRail(format!(
                "workload {} exceeded {} scheduled arrivals",
                spec.target, MAX_ARRIVALS_PER_WORKLOAD
            )));
        }

        let gap_ms = match &spec.pattern {
            ArrivalPattern::Poisson { rate_rps } => exponential_gap_ms(*rate_rps, rng)?,
            ArrivalPattern::Constant { rate_rps } => constant_gap_ms(*rate_rps)?,
            ArrivalPattern::Uniform { .. } => unreachable!("handled above by generate_uniform_arrivals"),
            ArrivalPattern::Normal { rate_rps, stddev_rps } => {
                let mean_gap = constant_gap_ms(*rate_rps)?;
                let stddev_gap = mean_gap * (stddev_rps / rate_rps).abs();
                rng.normal(mean_gap, stddev_gap.max(f64::EPSILON)).max(0.0)
            }
            ArrivalPattern::Bursty { burst_rate_rps, burst_s, quiet_s } => {
                if t >= burst_phase_until {
                    let phase_ms = if in_burst { *quiet_s } else { *burst_s };
                    burst_phase_until = t + (phase_ms * 1000.0) as SimTime;
                    in_burst = !in_burst;
                }
                if in_burst {
                    exponential_gap_ms(*burst_rate_rps, rng)?
                } else {
                    // Quiet phase: no arrivals until the phase ends.
                    (burst_phase_until - t).max(1)
                }
            }
        };

        t += gap_ms.max(1.0) as SimTime;
        if t < spec.end_ms {
            arrivals.push(t);
        }
    }

    Ok(arrivals)
}

fn validate_rate(rate_rps: f64) -> Result<(), SimError> {
    if rate_rps <= 0.0 {
        Err(SimError::InvalidInput(format!("arrival rate must be positive, got {rate_rps}")))
    } else {
        Ok(())
    }
}

fn constant_gap_ms(rate_rps: f64) -> Result<f64, SimError> {
    validate_rate(rate_rps)?;
    Ok(1000.0 / rate_rps)
}

fn exponential_gap_ms(rate_rps: f64, rng: &mut dyn SimRng) -> Result<f64, SimError> {
    validate_rate(rate_rps)?;
    Ok(rng.exponential(rate_rps / 1000.0))
}

/// Uniform pattern (spec §4.4): not a renewal process like the others —
/// draws `N = round(rate_rps * duration_s)` arrivals and scatters each
/// independently over `[start_ms, end_ms)`, then sorts them back into
/// fire-time order.
fn generate_uniform_arrivals(spec: &WorkloadSpec, rate_rps: f64, rng: &mut dyn SimRng) -> Result<Vec<SimTime>, SimError> {
    validate_rate(rate_rps)?;
    let span_ms = spec.end_ms.saturating_sub(spec.start_ms);
    let duration_s = span_ms as f64 / 1000.0;
    let n = (rate_rps * duration_s).round() as usize;

    if n > MAX_ARRIVALS_PER_WORKLOAD {
        return Err(SimError::SafetyRail(format!(
            "workload {} requested {} arrivals, exceeding the {} cap",
            spec.target, n, MAX_ARRIVALS_PER_WORKLOAD
        )));
    }

    let mut arrivals: Vec<SimTime> = (0..n)
        .map(|_| spec.start_ms + rng.uniform(0.0, span_ms as f64) as SimTime)
        .collect();
    arrivals.sort_unstable();
    Ok(arrivals)
}

/// One step of a multi-step user flow: call `service:endpoint` after
/// `delay_ms`, gated by a Bernoulli draw at `probability`.
#[derive(Debug, Clone)]
pub struct UserFlowStep {
    pub service: String,
    pub endpoint: String,
    pub delay_ms: SimTime,
    pub probability: f64,
}

/// A named sequence of steps sharing one `trace_id` once generated.
#[derive(Debug, Clone)]
pub struct UserFlow {
    pub name: String,
    pub steps: Vec<UserFlowStep>,
}

/// One realized step instance, with its absolute fire time resolved and
/// the shared trace id attached.
#[derive(Debug, Clone)]
pub struct FlowStepInstance {
    pub trace_id: String,
    pub service: String,
    pub endpoint: String,
    pub fire_time: SimTime,
}

/// Realizes a `UserFlow` starting at `start_t`: each step is included only
/// if its Bernoulli gate fires, and a gate miss does not advance or skip
/// later steps — each step's gate is independent (spec §4.4: user flows).
pub fn generate_flow_instance(
    flow: &UserFlow,
    start_t: SimTime,
    trace_id: String,
    rng: &mut dyn SimRng,
) -> Vec<FlowStepInstance> {
    let mut out = Vec::new();
    let mut t = start_t;

    for step in &flow.steps {
        t += step.delay_ms;
        if rng.bernoulli(step.probability) {
            out.push(FlowStepInstance {
                trace_id: trace_id.clone(),
                service: step.service.clone(),
                endpoint: step.endpoint.clone(),
                fire_time: t,
            });
        }
    }

    out
}
