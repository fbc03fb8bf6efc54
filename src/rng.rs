//! Seeded random number source for deterministic simulation.
//!
//! Mirrors the teacher's `rand::thread_rng()` usage in `mcts.rs`, but
//! wrapped behind a trait so the engine, workload generator, and policies
//! can share one seeded source and reproduce a trace given a seed (§4.5:
//! determinism).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, Normal, Poisson};

/// Sampling surface the core depends on. A seed of 0 means "use a
/// real-time seed" per spec.md §6.
pub trait SimRng: Send + Sync {
    fn uniform(&mut self, low: f64, high: f64) -> f64;
    fn exponential(&mut self, rate: f64) -> f64;
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64;
    fn bernoulli(&mut self, p: f64) -> bool;
    fn poisson(&mut self, lambda: f64) -> u64;
    fn gen_range_usize(&mut self, low: usize, high: usize) -> usize;
}

/// Default `SimRng` backed by `rand`'s `StdRng`.
pub struct StdSimRng {
    inner: StdRng,
}

impl StdSimRng {
    pub fn new(seed: u64) -> Self {
        let inner = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self { inner }
    }
}

impl SimRng for StdSimRng {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    fn exponential(&mut self, rate: f64) -> f64 {
        // Inverse-CDF sampling: -ln(1 - U) / rate, guarding U away from 1.
        let u: f64 = self.inner.gen_range(0.0..1.0_f64);
        -(1.0 - u).ln() / rate.max(f64::EPSILON)
    }

    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let dist = Normal::new(mean, std_dev.max(f64::EPSILON))
            .unwrap_or_else(|_| Normal::new(mean, f64::EPSILON).unwrap());
        dist.sample(&mut self.inner)
    }

    fn bernoulli(&mut self, p: f64) -> bool {
        let p = p.clamp(0.0, 1.0);
        Bernoulli::new(p).unwrap_or_else(|_| Bernoulli::new(0.0).unwrap()).sample(&mut self.inner)
    }

    fn poisson(&mut self, lambda: f64) -> u64 {
        let lambda = lambda.max(f64::EPSILON);
        Poisson::new(lambda).unwrap_or_else(|_| Poisson::new(f64::EPSILON).unwrap()).sample(&mut self.inner) as u64
    }

    fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_reproduces_same_sequence() {
        let mut a = StdSimRng::new(42);
        let mut b = StdSimRng::new(42);

        for _ in 0..20 {
            assert_eq!(a.uniform(0.0, 100.0), b.uniform(0.0, 100.0));
        }
    }

    #[test]
    fn exponential_is_nonnegative() {
        let mut rng = StdSimRng::new(7);
        for _ in 0..100 {
            assert!(rng.exponential(5.0) >= 0.0);
        }
    }
}
