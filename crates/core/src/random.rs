//! Seeded stochastic sampler
//!
//! Every draw in a replicate goes through [`RandomSource`]. Keeping a single
//! `ChaCha8Rng` per replicate, consumed in a fixed order, is what makes a rerun
//! with the same seed reproduce the identical event ledger.

use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution, LogNormal, Normal};
use std::collections::BTreeMap;

/// Per-replicate random number source
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
    seed: u64,
}

impl RandomSource {
    /// Create a source seeded for one replicate
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this source was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform integer in `[0, len)`. Returns 0 for an empty range.
    pub fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.random_range(0..len)
    }

    /// Bernoulli trial; `p` is clamped to `[0, 1]`
    pub fn bernoulli(&mut self, p: f64) -> bool {
        if p.is_nan() || p <= 0.0 {
            return false;
        }
        self.rng.random_bool(p.min(1.0))
    }

    /// Binomial count of successes out of `n` trials
    pub fn binomial(&mut self, n: u32, p: f64) -> u32 {
        if n == 0 || p.is_nan() || p <= 0.0 {
            return 0;
        }
        Binomial::new(u64::from(n), p.min(1.0))
            .map_or(0, |dist| dist.sample(&mut self.rng) as u32)
    }

    /// Normal draw. A degenerate spread returns the mean without consuming entropy.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return mean;
        }
        Normal::new(mean, std_dev).map_or(mean, |dist| dist.sample(&mut self.rng))
    }

    /// Lognormal draw parameterised by the underlying normal's `mu` and `sigma`
    pub fn lognormal(&mut self, mu: f64, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return mu.exp();
        }
        LogNormal::new(mu, sigma).map_or(mu.exp(), |dist| dist.sample(&mut self.rng))
    }

    /// Resample one element of an empirical distribution
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// Resample from the bucket whose key matches `category`.
    ///
    /// Returns `None` when no bucket matches or the bucket is empty.
    pub fn choose_matching<'a, T>(
        &mut self,
        buckets: &'a BTreeMap<String, Vec<T>>,
        category: &str,
    ) -> Option<&'a T> {
        let bucket = buckets.get(category)?;
        bucket.choose(&mut self.rng)
    }

    /// Shuffle in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}
