//! Method configuration and built-in presets
//!
//! A method is one `{deployment type × sensor model}` pairing plus its
//! scheduling, weather, travel and cost parameters. Presets reproduce the
//! default parameter sets for the common LDAR technologies.

use crate::core_types::facility::{GeoPoint, SiteMethodParams};
use crate::distribution::ScalarSource;
use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// How a method reaches facilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    /// Crews driving between sites
    Mobile,
    /// Fixed sensors installed at facilities
    Stationary,
    /// Satellite passes
    Orbital,
}

/// Unit a single detection decision is made on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementScale {
    /// Every leak individually
    Component,
    /// Aggregated rate of each equipment group
    Equipment,
    /// Aggregated rate of the whole site
    Site,
}

/// Probability-of-detection model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionModel {
    /// `Φ((rate − x0) / sigma)` Bernoulli detection (close-range optical)
    Sigmoid { x0: f64, sigma: f64 },
    /// Deterministic detection at or above `mdl` (screening, fixed sensors)
    Threshold { mdl: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub model: DetectionModel,
    /// Standard deviation of the lognormal multiplicative quantification error
    #[serde(default)]
    pub quantification_error: f64,
}

/// Operating envelope checked against the weather lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherLimits {
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub max_wind_mps: f64,
    pub max_precip_mm: f64,
}

impl Default for WeatherLimits {
    fn default() -> Self {
        Self {
            min_temp_c: -40.0,
            max_temp_c: 40.0,
            max_wind_mps: 10.0,
            max_precip_mm: 1.0,
        }
    }
}

/// Follow-up threshold, either a rate or a top-proportion of leak sizes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FollowUpThreshold {
    /// Rate in g/s
    Absolute(f64),
    /// Capture the largest `p` share of the leak-size distribution
    Proportion(f64),
}

/// How repeated screening measurements of a watched site combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyFilter {
    /// Latest measurement wins
    #[default]
    Recent,
    Max,
    Mean,
}

impl RedundancyFilter {
    /// Effective rate of a non-empty measurement series
    pub fn aggregate(self, values: &[f64]) -> f64 {
        match self {
            RedundancyFilter::Recent => values.last().copied().unwrap_or(0.0),
            RedundancyFilter::Max => values.iter().copied().fold(0.0, f64::max),
            RedundancyFilter::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowUpConfig {
    /// Method only surveys sites flagged by a screening method
    #[serde(default)]
    pub is_follow_up: bool,
    pub threshold: FollowUpThreshold,
    /// Fraction of above-threshold candidates retained when the watchlist is released
    pub ratio: f64,
    /// Days candidates wait on the watchlist before ranking; 0 ranks the same day
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default)]
    pub redundancy_filter: RedundancyFilter,
    /// Measured rate (g/s) at or above which a site is flagged without waiting
    #[serde(default)]
    pub instant_threshold: Option<f64>,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            is_follow_up: false,
            threshold: FollowUpThreshold::Absolute(0.0),
            ratio: 1.0,
            delay_days: 0,
            redundancy_filter: RedundancyFilter::Recent,
            instant_threshold: None,
        }
    }
}

/// Travel behaviour of mobile crews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelConfig {
    /// Visit nearest sites first and return to home bases
    #[serde(default)]
    pub route_planning: bool,
    /// Candidate driving speeds in km/h
    pub speed_list: Vec<f64>,
    #[serde(default)]
    pub home_bases: Vec<GeoPoint>,
    /// Starting point of every crew when route planning
    pub crew_init_location: Option<GeoPoint>,
    /// Minutes between sites when not route planning
    pub transit_minutes: ScalarSource,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            route_planning: false,
            speed_list: vec![80.0, 90.0, 100.0],
            home_bases: Vec::new(),
            crew_init_location: None,
            transit_minutes: ScalarSource::Fixed(30.0),
        }
    }
}

/// Method cost schedule in currency units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodCost {
    /// Charged once per crew or sensor on the first day
    pub upfront: f64,
    /// Charged for every working crew-day (sensor-day, orbit-day)
    pub per_day: f64,
    /// Charged for every completed site survey
    pub per_site: f64,
}

/// Fully materialized configuration of one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub label: String,
    pub deployment: DeploymentType,
    pub measurement_scale: MeasurementScale,
    pub sensor: SensorConfig,
    #[serde(default)]
    pub weather_limits: WeatherLimits,
    #[serde(default)]
    pub consider_daylight: bool,
    pub max_workday_hours: f64,
    /// A workday trimmed below this blocks the crew for the day
    #[serde(default)]
    pub min_workday_hours: f64,
    pub n_crews: u32,
    /// Days between flagging and the flag reaching the next stage
    pub reporting_delay: u32,
    #[serde(default)]
    pub follow_up: FollowUpConfig,
    #[serde(default)]
    pub travel: TravelConfig,
    /// Calendar years the method may deploy in (empty = every year)
    #[serde(default)]
    pub deployment_years: Vec<i32>,
    /// Calendar months 1-12 the method may deploy in (empty = every month)
    #[serde(default)]
    pub deployment_months: Vec<u32>,
    /// Survey requirements for facilities without an override
    pub site_defaults: SiteMethodParams,
    #[serde(default)]
    pub cost: MethodCost,
    /// Orbital only: most sites observed per day
    #[serde(default)]
    pub daily_site_cap: Option<usize>,
}

impl MethodConfig {
    /// Optical gas imaging crew surveying component by component
    pub fn ogi(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deployment: DeploymentType::Mobile,
            measurement_scale: MeasurementScale::Component,
            sensor: SensorConfig {
                model: DetectionModel::Sigmoid {
                    x0: 0.01275,
                    sigma: 2.78e-6,
                },
                quantification_error: 0.0,
            },
            weather_limits: WeatherLimits {
                min_temp_c: -20.0,
                max_temp_c: 40.0,
                max_wind_mps: 10.0,
                max_precip_mm: 1.0,
            },
            consider_daylight: false,
            max_workday_hours: 8.0,
            min_workday_hours: 0.0,
            n_crews: 1,
            reporting_delay: 2,
            follow_up: FollowUpConfig::default(),
            travel: TravelConfig::default(),
            deployment_years: Vec::new(),
            deployment_months: Vec::new(),
            site_defaults: SiteMethodParams {
                surveys_per_year: 3,
                survey_minutes: 120.0,
                min_interval_days: 60,
            },
            cost: MethodCost {
                upfront: 0.0,
                per_day: 2500.0,
                per_site: 0.0,
            },
            daily_site_cap: None,
        }
    }

    /// OGI crew that only visits sites flagged by a screening method
    pub fn ogi_follow_up(label: impl Into<String>) -> Self {
        let mut method = Self::ogi(label);
        method.follow_up.is_follow_up = true;
        method.reporting_delay = 0;
        method.site_defaults = SiteMethodParams {
            surveys_per_year: 365,
            survey_minutes: 120.0,
            min_interval_days: 0,
        };
        method
    }

    /// Truck-mounted screening at equipment scale with route planning
    pub fn truck(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deployment: DeploymentType::Mobile,
            measurement_scale: MeasurementScale::Equipment,
            sensor: SensorConfig {
                model: DetectionModel::Threshold { mdl: 0.05 },
                quantification_error: 0.0,
            },
            weather_limits: WeatherLimits {
                min_temp_c: -40.0,
                max_temp_c: 40.0,
                max_wind_mps: 20.0,
                max_precip_mm: 0.01,
            },
            consider_daylight: false,
            max_workday_hours: 8.0,
            min_workday_hours: 0.0,
            n_crews: 1,
            reporting_delay: 2,
            follow_up: FollowUpConfig::default(),
            travel: TravelConfig {
                route_planning: true,
                crew_init_location: Some(GeoPoint::new(51.044270, -114.062019)),
                ..TravelConfig::default()
            },
            deployment_years: Vec::new(),
            deployment_months: Vec::new(),
            site_defaults: SiteMethodParams {
                surveys_per_year: 4,
                survey_minutes: 30.0,
                min_interval_days: 30,
            },
            cost: MethodCost {
                upfront: 0.0,
                per_day: 2500.0,
                per_site: 0.0,
            },
            daily_site_cap: None,
        }
    }

    /// Continuous monitoring with fixed sensors
    pub fn continuous(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deployment: DeploymentType::Stationary,
            measurement_scale: MeasurementScale::Equipment,
            sensor: SensorConfig {
                model: DetectionModel::Threshold { mdl: 0.01 },
                quantification_error: 0.0,
            },
            weather_limits: WeatherLimits {
                min_temp_c: -30.0,
                max_temp_c: 40.0,
                max_wind_mps: 10.0,
                max_precip_mm: 1.0,
            },
            consider_daylight: false,
            max_workday_hours: 24.0,
            min_workday_hours: 0.0,
            n_crews: 1,
            reporting_delay: 2,
            follow_up: FollowUpConfig::default(),
            travel: TravelConfig::default(),
            deployment_years: Vec::new(),
            deployment_months: Vec::new(),
            site_defaults: SiteMethodParams {
                surveys_per_year: 365,
                survey_minutes: 0.0,
                min_interval_days: 1,
            },
            cost: MethodCost {
                upfront: 500.0,
                per_day: 1.0,
                per_site: 0.0,
            },
            daily_site_cap: None,
        }
    }

    /// Satellite screening at site scale
    pub fn satellite(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deployment: DeploymentType::Orbital,
            measurement_scale: MeasurementScale::Site,
            sensor: SensorConfig {
                model: DetectionModel::Threshold { mdl: 0.01 },
                quantification_error: 0.0,
            },
            weather_limits: WeatherLimits {
                min_temp_c: -100.0,
                max_temp_c: 100.0,
                max_wind_mps: 100.0,
                max_precip_mm: 100.0,
            },
            consider_daylight: false,
            max_workday_hours: 24.0,
            min_workday_hours: 0.0,
            n_crews: 1,
            reporting_delay: 2,
            follow_up: FollowUpConfig::default(),
            travel: TravelConfig::default(),
            deployment_years: Vec::new(),
            deployment_months: Vec::new(),
            site_defaults: SiteMethodParams {
                surveys_per_year: 12,
                survey_minutes: 0.0,
                min_interval_days: 25,
            },
            cost: MethodCost {
                upfront: 0.0,
                per_day: 10000.0,
                per_site: 0.0,
            },
            daily_site_cap: None,
        }
    }

    /// Builder: replace the follow-up triage settings
    pub fn with_follow_up(mut self, threshold: FollowUpThreshold, ratio: f64) -> Self {
        self.follow_up.threshold = threshold;
        self.follow_up.ratio = ratio;
        self
    }

    /// Builder: hold candidates on a watchlist for `days` before ranking
    pub fn with_follow_up_delay(mut self, days: u32, filter: RedundancyFilter) -> Self {
        self.follow_up.delay_days = days;
        self.follow_up.redundancy_filter = filter;
        self
    }

    /// Builder: flag sites measured at or above `rate` immediately
    pub fn with_instant_threshold(mut self, rate: f64) -> Self {
        self.follow_up.instant_threshold = Some(rate);
        self
    }

    /// Builder: set the number of crews
    pub fn with_crews(mut self, n_crews: u32) -> Self {
        self.n_crews = n_crews;
        self
    }

    /// Builder: replace default site requirements
    pub fn with_site_defaults(mut self, params: SiteMethodParams) -> Self {
        self.site_defaults = params;
        self
    }

    /// Screening methods feed the follow-up ranking; confirmatory ones tag leaks
    pub fn is_screening(&self) -> bool {
        self.measurement_scale != MeasurementScale::Component
    }

    /// Check internal consistency before a replicate is built
    pub fn validate(&self) -> SimResult<()> {
        let ctx = || format!("method '{}'", self.label);
        if self.label.trim().is_empty() {
            return Err(SimError::config("method", "label must not be empty"));
        }
        match self.sensor.model {
            DetectionModel::Sigmoid { x0, sigma } if x0.is_nan() || x0 < 0.0 || sigma.is_nan() || sigma <= 0.0 => {
                return Err(SimError::config(
                    ctx(),
                    format!("sigmoid model needs x0 >= 0 and sigma > 0, got x0={x0} sigma={sigma}"),
                ));
            }
            DetectionModel::Threshold { mdl } if mdl.is_nan() || mdl < 0.0 => {
                return Err(SimError::config(ctx(), format!("MDL must be >= 0, got {mdl}")));
            }
            _ => {}
        }
        let qe = self.sensor.quantification_error;
        if qe.is_nan() || qe < 0.0 {
            return Err(SimError::config(ctx(), "quantification error must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.follow_up.ratio) {
            return Err(SimError::config(
                ctx(),
                format!("follow-up ratio must be in [0, 1], got {}", self.follow_up.ratio),
            ));
        }
        if let FollowUpThreshold::Proportion(p) = self.follow_up.threshold {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::config(ctx(), format!("proportion threshold {p} outside [0, 1]")));
            }
        }
        if let Some(rate) = self.follow_up.instant_threshold {
            if rate.is_nan() || rate < 0.0 {
                return Err(SimError::config(ctx(), format!("instant threshold must be >= 0, got {rate}")));
            }
        }
        if self.n_crews == 0 {
            return Err(SimError::config(ctx(), "at least one crew is required"));
        }
        let workday = self.max_workday_hours;
        if workday.is_nan() || workday <= 0.0 || workday > 24.0 {
            return Err(SimError::config(ctx(), "max workday must be in (0, 24] hours"));
        }
        if self.deployment_months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(SimError::config(ctx(), "deployment months must be 1-12"));
        }
        if self.deployment == DeploymentType::Mobile {
            if self.travel.route_planning {
                if self.travel.speed_list.is_empty() || self.travel.speed_list.iter().any(|s| *s <= 0.0) {
                    return Err(SimError::config(ctx(), "route planning needs positive speeds"));
                }
                if self.travel.crew_init_location.is_none() && self.travel.home_bases.is_empty() {
                    return Err(SimError::config(
                        ctx(),
                        "route planning needs a crew start location or home bases",
                    ));
                }
            } else if self.travel.transit_minutes.is_empty() {
                return Err(SimError::config(ctx(), "transit time distribution is empty"));
            }
        }
        if self.follow_up.is_follow_up && self.is_screening() {
            return Err(SimError::config(ctx(), "follow-up methods must survey at component scale"));
        }
        Ok(())
    }
}
