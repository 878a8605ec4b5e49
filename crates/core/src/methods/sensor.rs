//! Detection engine: probability-of-detection models and site measurement
//!
//! A survey of one site produces a [`SurveyOutcome`]. Component-scale methods
//! decide per leak; equipment-scale methods decide per equipment group and
//! report the summed detected rate; site-scale methods decide once on the
//! aggregate rate. Quantification error is a multiplicative lognormal factor
//! and never enters the threshold model's detection decision.

use crate::config::method::{DetectionModel, FollowUpThreshold, MeasurementScale, SensorConfig};
use crate::config::program::EmissionsConfig;
use crate::core_types::facility::Facility;
use crate::core_types::ids::{FacilityId, LeakId};
use crate::core_types::units::GramsPerSecond;
use crate::distribution::proportion_rate;
use crate::emissions::pool::LeakPool;
use crate::random::RandomSource;

/// Leak-size draws used to turn a proportion threshold into a rate
const PROPORTION_REFERENCE_DRAWS: usize = 10_000;

// ============================================================================
// NORMAL CDF
// ============================================================================

/// Error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(z: f64) -> f64 {
    (0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))).clamp(0.0, 1.0)
}

// ============================================================================
// SURVEY OUTCOMES
// ============================================================================

/// Aggregate measurement of a screened site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteMeasurement {
    pub measured: GramsPerSecond,
    /// Would have stayed below the threshold without vented emissions
    pub vent_driven: bool,
}

/// Everything one completed site survey found
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyOutcome {
    pub facility: FacilityId,
    /// Component scale: detected leaks at or above the follow-up threshold
    pub leak_flags: Vec<(LeakId, GramsPerSecond)>,
    /// Equipment/site scale: flag raised for the whole site
    pub site_flag: Option<SiteMeasurement>,
    /// Leaks present but not detected (component scale only)
    pub missed_leaks: u32,
}

impl SurveyOutcome {
    fn empty(facility: FacilityId) -> Self {
        Self {
            facility,
            leak_flags: Vec::new(),
            site_flag: None,
            missed_leaks: 0,
        }
    }
}

// ============================================================================
// DETECTION ENGINE
// ============================================================================

/// Sensor model of one method plus its resolved follow-up threshold
#[derive(Debug, Clone, Copy)]
pub struct DetectionEngine {
    model: DetectionModel,
    quantification_error: f64,
    threshold: GramsPerSecond,
}

impl DetectionEngine {
    pub fn new(sensor: SensorConfig, threshold: GramsPerSecond) -> Self {
        Self {
            model: sensor.model,
            quantification_error: sensor.quantification_error,
            threshold,
        }
    }

    /// Resolve a follow-up threshold to a rate.
    ///
    /// Proportion thresholds are computed once from the leak-size distribution.
    pub fn resolve_threshold(
        threshold: FollowUpThreshold,
        emissions: &EmissionsConfig,
        rng: &mut RandomSource,
    ) -> GramsPerSecond {
        match threshold {
            FollowUpThreshold::Absolute(rate) => GramsPerSecond::new(rate),
            FollowUpThreshold::Proportion(p) => {
                let rates = emissions
                    .leak_rates
                    .reference_rates(rng, PROPORTION_REFERENCE_DRAWS);
                GramsPerSecond::new(proportion_rate(p, &rates))
            }
        }
    }

    pub fn threshold(&self) -> GramsPerSecond {
        self.threshold
    }

    /// Probability that a source of `rate` is detected
    pub fn probability(&self, rate: GramsPerSecond) -> f64 {
        match self.model {
            DetectionModel::Sigmoid { x0, sigma } => normal_cdf((*rate - x0) / sigma),
            DetectionModel::Threshold { mdl } => {
                if *rate >= mdl {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn detected(&self, rate: GramsPerSecond, rng: &mut RandomSource) -> bool {
        match self.model {
            DetectionModel::Sigmoid { .. } => rng.bernoulli(self.probability(rate)),
            DetectionModel::Threshold { mdl } => *rate >= mdl,
        }
    }

    /// Multiplicative quantification noise; exactly 1 when QE is zero
    fn noise_factor(&self, rng: &mut RandomSource) -> f64 {
        if self.quantification_error > 0.0 {
            rng.normal(0.0, self.quantification_error).exp()
        } else {
            1.0
        }
    }

    /// Detect a single source. Returns the measured rate when detected.
    pub fn detect(&self, rate: GramsPerSecond, rng: &mut RandomSource) -> Option<GramsPerSecond> {
        if !self.detected(rate, rng) {
            return None;
        }
        Some(rate * self.noise_factor(rng))
    }

    /// Inclusive follow-up threshold test
    #[inline]
    pub fn passes_threshold(&self, measured: GramsPerSecond) -> bool {
        measured >= self.threshold
    }

    /// Survey one site at the given measurement scale
    pub fn survey(
        &self,
        scale: MeasurementScale,
        facility: &Facility,
        pool: &LeakPool,
        rng: &mut RandomSource,
    ) -> SurveyOutcome {
        let mut outcome = SurveyOutcome::empty(facility.id);
        match scale {
            MeasurementScale::Component => {
                for leak in pool.leaks_at(facility.id) {
                    match self.detect(leak.rate, rng) {
                        Some(measured) if self.passes_threshold(measured) => {
                            outcome.leak_flags.push((leak.id, measured));
                        }
                        Some(_) => {}
                        None => outcome.missed_leaks += 1,
                    }
                }
            }
            MeasurementScale::Equipment => {
                let Some(state) = pool.site_state(facility.id) else {
                    return outcome;
                };
                let mut measured = GramsPerSecond::ZERO;
                let mut measured_leaks = GramsPerSecond::ZERO;
                for (group, leak_rate) in state.group_rates.iter().enumerate() {
                    let total = state.group_rate(group);
                    if !self.detected(total, rng) {
                        continue;
                    }
                    let factor = self.noise_factor(rng);
                    measured += total * factor;
                    measured_leaks += *leak_rate * factor;
                }
                outcome.site_flag = self.site_flag(measured, measured_leaks);
            }
            MeasurementScale::Site => {
                let Some(state) = pool.site_state(facility.id) else {
                    return outcome;
                };
                let total = state.total_rate();
                if self.detected(total, rng) {
                    let factor = self.noise_factor(rng);
                    outcome.site_flag = self.site_flag(total * factor, state.leak_rate * factor);
                }
            }
        }
        outcome
    }

    fn site_flag(
        &self,
        measured: GramsPerSecond,
        measured_leaks: GramsPerSecond,
    ) -> Option<SiteMeasurement> {
        if *measured <= 0.0 || !self.passes_threshold(measured) {
            return None;
        }
        Some(SiteMeasurement {
            measured,
            vent_driven: !self.passes_threshold(measured_leaks),
        })
    }
}
