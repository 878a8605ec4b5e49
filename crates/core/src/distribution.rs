//! Sampling sources for leak rates, leak counts and scalar inputs
//!
//! These are the in-memory form of the CSV-backed input distributions. They hold
//! data only; every draw goes through [`RandomSource`].

use crate::core_types::facility::Facility;
use crate::core_types::units::GramsPerSecond;
use crate::error::{SimError, SimResult};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Emission-rate distribution (values in g/s)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateDistribution {
    /// Resample with replacement from measured rates
    Empirical { samples: Vec<f64> },
    /// Parametric lognormal; `mu`/`sigma` describe `ln(rate in g/s)`
    LogNormal { mu: f64, sigma: f64 },
    /// Resample from the bucket matching a facility attribute
    Categorized {
        attribute: String,
        buckets: BTreeMap<String, Vec<f64>>,
    },
}

impl RateDistribution {
    /// Draw one rate for `facility`.
    ///
    /// `what` names the distribution in error messages ("leak rate", "vent rate").
    pub fn sample(
        &self,
        facility: &Facility,
        rng: &mut RandomSource,
        what: &str,
    ) -> SimResult<GramsPerSecond> {
        let value = match self {
            RateDistribution::Empirical { samples } => {
                *rng.choose(samples).ok_or_else(|| empty_distribution(what))?
            }
            RateDistribution::LogNormal { mu, sigma } => rng.lognormal(*mu, *sigma),
            RateDistribution::Categorized { attribute, buckets } => {
                let category = facility.attribute(attribute).unwrap_or_default();
                *rng.choose_matching(buckets, category).ok_or_else(|| {
                    SimError::DistributionMismatch {
                        distribution: what.to_string(),
                        facility: facility.name.clone(),
                        attribute: attribute.clone(),
                        category: category.to_string(),
                    }
                })?
            }
        };
        Ok(GramsPerSecond::new(value))
    }

    /// Check that every facility can be served by this distribution.
    pub fn check_coverage(&self, facilities: &[Facility], what: &str) -> SimResult<()> {
        match self {
            RateDistribution::Empirical { samples } if samples.is_empty() => {
                Err(empty_distribution(what))
            }
            RateDistribution::Categorized { attribute, buckets } => {
                check_buckets(buckets, attribute, facilities, what)
            }
            _ => Ok(()),
        }
    }

    /// Representative rate sample used to derive proportion-based thresholds.
    ///
    /// Empirical sources return their data; parametric sources are sampled `n` times.
    pub fn reference_rates(&self, rng: &mut RandomSource, n: usize) -> Vec<f64> {
        match self {
            RateDistribution::Empirical { samples } => samples.clone(),
            RateDistribution::LogNormal { mu, sigma } => {
                (0..n).map(|_| rng.lognormal(*mu, *sigma)).collect()
            }
            RateDistribution::Categorized { buckets, .. } => {
                buckets.values().flatten().copied().collect()
            }
        }
    }
}

/// How many leaks each facility carries when the simulation starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitialLeakCount {
    /// No pre-existing leaks
    None,
    /// Resample from an empirical leak-count list
    Empirical { counts: Vec<u32> },
    /// Resample from the bucket matching a facility attribute
    Categorized {
        attribute: String,
        buckets: BTreeMap<String, Vec<u32>>,
    },
    /// `Binomial(NRd, LPR)` leaks with ages spread uniformly over `[0, NRd)`
    SteadyState,
}

impl InitialLeakCount {
    /// Draw the number of initial leaks for `facility`.
    ///
    /// `SteadyState` needs the leak production rate and horizon, passed as `lpr`/`nrd`.
    pub fn sample(
        &self,
        facility: &Facility,
        lpr: f64,
        nrd: u32,
        rng: &mut RandomSource,
    ) -> SimResult<u32> {
        match self {
            InitialLeakCount::None => Ok(0),
            InitialLeakCount::Empirical { counts } => rng
                .choose(counts)
                .copied()
                .ok_or_else(|| empty_distribution("leak count")),
            InitialLeakCount::Categorized { attribute, buckets } => {
                let category = facility.attribute(attribute).unwrap_or_default();
                rng.choose_matching(buckets, category).copied().ok_or_else(|| {
                    SimError::DistributionMismatch {
                        distribution: "leak count".to_string(),
                        facility: facility.name.clone(),
                        attribute: attribute.clone(),
                        category: category.to_string(),
                    }
                })
            }
            InitialLeakCount::SteadyState => Ok(rng.binomial(nrd, lpr)),
        }
    }

    pub fn check_coverage(&self, facilities: &[Facility]) -> SimResult<()> {
        match self {
            InitialLeakCount::Empirical { counts } if counts.is_empty() => {
                Err(empty_distribution("leak count"))
            }
            InitialLeakCount::Categorized { attribute, buckets } => {
                check_buckets(buckets, attribute, facilities, "leak count")
            }
            _ => Ok(()),
        }
    }
}

/// A scalar input that is either fixed or resampled from data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarSource {
    Fixed(f64),
    Empirical(Vec<f64>),
}

impl ScalarSource {
    /// Draw a value. An empty empirical list yields zero.
    pub fn sample(&self, rng: &mut RandomSource) -> f64 {
        match self {
            ScalarSource::Fixed(v) => *v,
            ScalarSource::Empirical(values) => rng.choose(values).copied().unwrap_or(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ScalarSource::Empirical(values) if values.is_empty())
    }
}

impl Default for ScalarSource {
    fn default() -> Self {
        ScalarSource::Fixed(0.0)
    }
}

/// Emission rate that captures the top `proportion` of sources in `rates`.
///
/// Sorts the rates, builds their cumulative-emission curve, then interpolates
/// the rate at which the largest `proportion` of sources begin. For example a
/// proportion of 0.01 yields the detection limit needed to find the top 1% of
/// leak sizes.
pub fn proportion_rate(proportion: f64, rates: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = rates.iter().copied().filter(|r| r.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }

    let mut cumulative = Vec::with_capacity(sorted.len());
    let mut running = 0.0;
    for rate in &sorted {
        running += rate;
        cumulative.push(running);
    }
    let total = running;
    if total <= 0.0 {
        return 0.0;
    }
    let cum_prop: Vec<f64> = cumulative.iter().map(|c| c / total).collect();
    let last = (sorted.len() - 1) as f64;
    let position: Vec<f64> = (0..sorted.len()).map(|i| i as f64 / last).collect();

    let prop_emissions = interp(1.0 - proportion.clamp(0.0, 1.0), &position, &cum_prop);
    interp(prop_emissions * total, &cumulative, &sorted)
}

/// Piecewise-linear interpolation over increasing `xp`, clamped at both ends
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if x <= xp[0] {
        return fp[0];
    }
    let n = xp.len();
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let upper = xp.partition_point(|v| *v < x);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span <= 0.0 {
        return fp[upper];
    }
    let t = (x - xp[lower]) / span;
    fp[lower] + t * (fp[upper] - fp[lower])
}

fn empty_distribution(what: &str) -> SimError {
    SimError::config(what, "empirical distribution has no samples")
}

fn check_buckets<T>(
    buckets: &BTreeMap<String, Vec<T>>,
    attribute: &str,
    facilities: &[Facility],
    what: &str,
) -> SimResult<()> {
    for facility in facilities {
        let category = facility.attribute(attribute).unwrap_or_default();
        let covered = buckets.get(category).is_some_and(|b| !b.is_empty());
        if !covered {
            return Err(SimError::DistributionMismatch {
                distribution: what.to_string(),
                facility: facility.name.clone(),
                attribute: attribute.to_string(),
                category: category.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_categorized_mismatch_is_an_error() {
        let mut buckets = BTreeMap::new();
        buckets.insert("1".to_string(), vec![0.5]);
        let dist = RateDistribution::Categorized {
            attribute: "subtype_code".to_string(),
            buckets,
        };
        let mut rng = RandomSource::seeded(1);
        let ok = Facility::new("a", 50.0, -110.0).with_attribute("subtype_code", "1");
        let bad = Facility::new("b", 50.0, -110.0).with_attribute("subtype_code", "2");
        assert_eq!(*dist.sample(&ok, &mut rng, "leak rate").unwrap(), 0.5);
        let err = dist.sample(&bad, &mut rng, "leak rate").unwrap_err();
        assert!(matches!(err, SimError::DistributionMismatch { ref category, .. } if category == "2"));
        assert!(dist.check_coverage(&[ok, bad], "leak rate").is_err());
    }

    #[test]
    fn test_steady_state_count_bounds() {
        let facility = Facility::new("a", 50.0, -110.0);
        let mut rng = RandomSource::seeded(5);
        for _ in 0..100 {
            let n = InitialLeakCount::SteadyState
                .sample(&facility, 0.01, 150, &mut rng)
                .unwrap();
            assert!(n <= 150);
        }
        assert_eq!(
            InitialLeakCount::None.sample(&facility, 0.5, 10, &mut rng).unwrap(),
            0
        );
    }

    #[test]
    fn test_proportion_rate_picks_large_sources() {
        let rates: Vec<f64> = (1..=100).map(f64::from).collect();
        let top_10 = proportion_rate(0.1, &rates);
        let top_50 = proportion_rate(0.5, &rates);
        assert!(top_10 > top_50, "{top_10} vs {top_50}");
        assert!(top_10 > 1.0 && top_10 < 100.0);
        assert_relative_eq!(proportion_rate(0.0, &rates), 100.0);
        assert_relative_eq!(proportion_rate(1.0, &rates), 1.0);
    }

    #[test]
    fn test_proportion_rate_degenerate_inputs() {
        assert_eq!(proportion_rate(0.1, &[]), 0.0);
        assert_eq!(proportion_rate(0.1, &[3.0]), 3.0);
    }

    #[test]
    fn test_scalar_source() {
        let mut rng = RandomSource::seeded(1);
        assert_eq!(ScalarSource::Fixed(30.0).sample(&mut rng), 30.0);
        let v = ScalarSource::Empirical(vec![10.0, 20.0]).sample(&mut rng);
        assert!(v == 10.0 || v == 20.0);
        assert!(ScalarSource::Empirical(vec![]).is_empty());
    }
}
