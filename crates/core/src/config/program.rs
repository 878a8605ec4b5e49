//! Program-level configuration: horizon, emissions, operator and repair

use crate::config::method::MethodConfig;
use crate::distribution::{InitialLeakCount, RateDistribution, ScalarSource};
use crate::error::{SimError, SimResult};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// 100 kg/h expressed in g/s
pub const DEFAULT_MAX_LEAK_RATE: f64 = 100.0 / 3.6;

/// Leak emergence and sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsConfig {
    /// Daily per-site probability of a new leak
    pub lpr: f64,
    /// Rates above this cap (g/s) are truncated
    pub max_leak_rate: f64,
    pub leak_rates: RateDistribution,
    pub initial_leaks: InitialLeakCount,
    /// Natural repair horizon in days (NRd)
    pub nrd_days: u32,
    /// Route leaks reaching NRd into repair
    #[serde(default)]
    pub natural_repair: bool,
    /// Design vent rate per facility, drawn once
    #[serde(default)]
    pub venting: Option<RateDistribution>,
}

impl Default for EmissionsConfig {
    fn default() -> Self {
        Self {
            lpr: 0.0065,
            max_leak_rate: DEFAULT_MAX_LEAK_RATE,
            // ln(kg/h) parameters (-2.776, 1.462) shifted to g/s
            leak_rates: RateDistribution::LogNormal {
                mu: -2.776 - 3.6f64.ln(),
                sigma: 1.462,
            },
            initial_leaks: InitialLeakCount::SteadyState,
            nrd_days: 150,
            natural_repair: false,
            venting: None,
        }
    }
}

/// Weekly operator walk-around
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub weekday: Weekday,
    /// Scales the overall operator detection probability (0 disables)
    pub strength: f64,
    /// Extra detection probability reached at the maximum leak rate
    pub max_det_op: f64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            weekday: Weekday::Mon,
            strength: 0.0,
            max_det_op: 0.0,
        }
    }
}

/// Post-repair verification survey
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub delay_days: u32,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Days between a leak's report and its repair
    pub repair_delay: u32,
    pub repair_cost: ScalarSource,
    #[serde(default)]
    pub verification: Option<VerificationConfig>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            repair_delay: 14,
            repair_cost: ScalarSource::Fixed(200.0),
            verification: Some(VerificationConfig {
                delay_days: 0,
                cost: 25.0,
            }),
        }
    }
}

/// Immutable description of one LDAR program run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub name: String,
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
    /// Apply method weather envelopes
    pub consider_weather: bool,
    /// Resample the facility list with replacement to this many sites
    #[serde(default)]
    pub site_samples: Option<usize>,
    #[serde(default)]
    pub emissions: EmissionsConfig,
    #[serde(default)]
    pub operator: Option<OperatorConfig>,
    #[serde(default)]
    pub repair: RepairConfig,
    /// Materialized methods in evaluation order
    pub methods: Vec<MethodConfig>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            name: "P_base".to_string(),
            start_date: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap_or_default(),
            consider_weather: false,
            site_samples: None,
            emissions: EmissionsConfig::default(),
            operator: None,
            repair: RepairConfig::default(),
            methods: Vec::new(),
        }
    }
}

impl ProgramConfig {
    pub fn new(name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start_date,
            end_date,
            ..Self::default()
        }
    }

    /// Builder: append a method
    pub fn with_method(mut self, method: MethodConfig) -> Self {
        self.methods.push(method);
        self
    }

    /// Number of simulated days, both ends inclusive
    pub fn horizon_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// True when any method only surveys flagged sites
    pub fn has_follow_up_method(&self) -> bool {
        self.methods.iter().any(|m| m.follow_up.is_follow_up)
    }

    /// Reject configurations that cannot be simulated
    pub fn validate(&self) -> SimResult<()> {
        let ctx = || format!("program '{}'", self.name);
        if self.end_date < self.start_date {
            return Err(SimError::config(
                ctx(),
                format!("end date {} precedes start date {}", self.end_date, self.start_date),
            ));
        }
        let e = &self.emissions;
        if !(0.0..=1.0).contains(&e.lpr) {
            return Err(SimError::config(ctx(), format!("LPR must be in [0, 1], got {}", e.lpr)));
        }
        if e.max_leak_rate.is_nan() || e.max_leak_rate <= 0.0 {
            return Err(SimError::config(ctx(), "maximum leak rate must be positive"));
        }
        if e.natural_repair && e.nrd_days == 0 {
            return Err(SimError::config(ctx(), "natural repair needs NRd > 0"));
        }
        if let RateDistribution::LogNormal { sigma, .. } = e.leak_rates {
            if sigma < 0.0 {
                return Err(SimError::config(ctx(), "lognormal sigma must be >= 0"));
            }
        }
        if let Some(op) = &self.operator {
            if op.strength < 0.0 || op.max_det_op < 0.0 {
                return Err(SimError::config(ctx(), "operator parameters must be >= 0"));
            }
        }
        if self.repair.repair_cost.is_empty() {
            return Err(SimError::config(ctx(), "repair cost distribution is empty"));
        }
        if self.site_samples == Some(0) {
            return Err(SimError::config(ctx(), "site_samples must be positive"));
        }

        let mut labels = std::collections::BTreeSet::new();
        for method in &self.methods {
            method.validate()?;
            if !labels.insert(method.label.as_str()) {
                return Err(SimError::config(
                    ctx(),
                    format!("duplicate method label '{}'", method.label),
                ));
            }
        }
        let screening = self.methods.iter().any(MethodConfig::is_screening);
        if self.has_follow_up_method() && !screening {
            return Err(SimError::config(
                ctx(),
                "a follow-up method needs at least one screening method",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_program_is_valid() {
        let program = ProgramConfig::default().with_method(MethodConfig::ogi("OGI"));
        program.validate().unwrap();
        assert_eq!(program.horizon_days(), 365 * 3);
    }

    #[test]
    fn test_reversed_dates_rejected() {
        let program = ProgramConfig::new("p", date(2020, 1, 2), date(2020, 1, 1));
        assert!(matches!(program.validate(), Err(SimError::Configuration { .. })));
    }

    #[test]
    fn test_follow_up_without_screening_rejected() {
        let program = ProgramConfig::new("p", date(2020, 1, 1), date(2020, 2, 1))
            .with_method(MethodConfig::ogi_follow_up("OGI_FU"));
        let err = program.validate().unwrap_err();
        assert!(err.to_string().contains("screening"));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let program = ProgramConfig::new("p", date(2020, 1, 1), date(2020, 2, 1))
            .with_method(MethodConfig::ogi("OGI"))
            .with_method(MethodConfig::ogi("OGI"));
        assert!(program.validate().is_err());
    }
}
