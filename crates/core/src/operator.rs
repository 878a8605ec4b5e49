//! Weekly operator walk-around
//!
//! Site operators notice leaks independently of any LDAR method. On the
//! configured weekday every emitting leak gets a detection draw with
//!
//! ```text
//! p = clamp(LPR · 7 / leak_term + max_det_op · rate / max_leak_rate, 0, 1) · strength
//! leak_term = (initial_leaks / active_leaks) · (initial_leaks / sites)
//! ```
//!
//! The base term is zero when the run started without initial leaks.

use crate::config::program::{EmissionsConfig, OperatorConfig};
use crate::core_types::ids::LeakId;
use crate::core_types::units::GramsPerSecond;
use crate::emissions::pool::LeakPool;
use crate::random::RandomSource;
use chrono::{Datelike, NaiveDate};

/// Leaks the operator noticed on one check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorFindings {
    /// Untagged leaks to route into repair
    pub detected: Vec<LeakId>,
    /// Detections of leaks already in the pipeline
    pub redundant: u64,
}

#[derive(Debug, Clone)]
pub struct OperatorModule {
    config: OperatorConfig,
    lpr: f64,
    max_leak_rate: f64,
    initial_leaks: f64,
    mean_initial_per_site: f64,
}

impl OperatorModule {
    /// `initial_leaks` is the number of leaks seeded at start across `sites`
    pub fn new(
        config: OperatorConfig,
        emissions: &EmissionsConfig,
        initial_leaks: usize,
        sites: usize,
    ) -> Self {
        let initial = initial_leaks as f64;
        Self {
            config,
            lpr: emissions.lpr,
            max_leak_rate: emissions.max_leak_rate,
            initial_leaks: initial,
            mean_initial_per_site: if sites == 0 { 0.0 } else { initial / sites as f64 },
        }
    }

    pub fn is_check_day(&self, date: NaiveDate) -> bool {
        date.weekday() == self.config.weekday
    }

    /// Detection probability of one leak given the current pool size
    pub fn probability(&self, rate: GramsPerSecond, active_leaks: usize) -> f64 {
        let leak_term = if active_leaks == 0 {
            0.0
        } else {
            self.initial_leaks / active_leaks as f64 * self.mean_initial_per_site
        };
        let base = if leak_term > 0.0 {
            self.lpr * 7.0 / leak_term
        } else {
            0.0
        };
        let size = self.config.max_det_op * (*rate / self.max_leak_rate);
        (base + size).clamp(0.0, 1.0) * self.config.strength
    }

    /// Run the weekly check; does nothing on other weekdays
    pub fn run_weekly_check(
        &self,
        today: NaiveDate,
        pool: &LeakPool,
        rng: &mut RandomSource,
    ) -> OperatorFindings {
        let mut findings = OperatorFindings::default();
        if !self.is_check_day(today) || self.config.strength <= 0.0 {
            return findings;
        }
        let active = pool.len();
        for leak in pool.iter() {
            if !rng.bernoulli(self.probability(leak.rate, active)) {
                continue;
            }
            if leak.is_tagged() {
                findings.redundant += 1;
            } else {
                findings.detected.push(leak.id);
            }
        }
        findings
    }
}
