//! The per-run random generator.
//!
//! Every random draw of a run (delay samples, dependency coin flips, load
//! balancing tie-breaks) comes from one [`SimRng`] created from
//! [`crate::SimulationConfig::seed`]. It is owned by whoever drives the run and
//! passed by `&mut` to each consumer, so the order of draws is exactly the
//! order of events and a fixed seed replays the whole run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded generator shared, by explicit `&mut` borrow, across one run.
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    draws: u64,
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn so far. Useful for checking that two runs
    /// consumed randomness identically.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Bernoulli trial with success probability `p`.
    ///
    /// `p` must lie in [0, 1]; callers validate it at construction. Exactly
    /// one value is consumed whatever `p` is, including 0 and 1.
    pub fn chance(&mut self, p: f64) -> bool {
        self.draws += 1;
        self.inner.gen::<f64>() < p
    }

    /// Uniform index in `0..len`. `len` must be positive.
    pub fn index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "index() called with empty range");
        self.draws += 1;
        self.inner.gen_range(0..len)
    }

    /// Draw from any `rand` distribution.
    pub fn sample<T, D: rand_distr::Distribution<T>>(&mut self, dist: &D) -> T {
        self.draws += 1;
        dist.sample(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.index(1000), b.index(1000));
        }
        assert_eq!(a.draws(), 100);
    }

    #[test]
    fn chance_extremes() {
        let mut rng = SimRng::new(1);
        for _ in 0..1000 {
            assert!(!rng.chance(0.0));
            assert!(rng.chance(1.0));
        }
    }

    #[test]
    fn chance_consumes_one_value_for_any_probability() {
        let after = |p: f64| {
            let mut rng = SimRng::new(8);
            rng.chance(p);
            (rng.index(1_000_000), rng.draws())
        };
        let reference = after(0.5);
        assert_eq!(after(0.0), reference);
        assert_eq!(after(1.0), reference);
        assert_eq!(reference.1, 2);
    }
}
