//! Error taxonomy for a simulation replicate
//!
//! Every variant is fatal for the replicate that raised it. Shortfalls that are
//! an expected outcome of scheduling (weather blackouts, exhausted workdays,
//! unmet survey quotas) are recorded in the ledger instead and never surface here.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Fatal errors raised while building or running one replicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Missing or invalid program/method configuration.
    #[error("configuration error in {context}: {reason}")]
    Configuration { context: String, reason: String },

    /// No sampling bucket matches a facility's category.
    #[error(
        "no {distribution} entry matches {attribute}='{category}' for facility '{facility}'"
    )]
    DistributionMismatch {
        distribution: String,
        facility: String,
        attribute: String,
        category: String,
    },

    /// Weather data does not cover a requested timestamp or location.
    #[error("weather data does not cover {at} at ({lat:.4}, {lon:.4}){}", method_suffix(.method))]
    WeatherCoverage {
        at: NaiveDateTime,
        lat: f64,
        lon: f64,
        method: Option<String>,
    },
}

fn method_suffix(method: &Option<String>) -> String {
    method
        .as_ref()
        .map(|m| format!(" (method '{m}')"))
        .unwrap_or_default()
}

impl SimError {
    /// Shorthand for a configuration error.
    pub fn config(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Attach a method label to a weather coverage error that lacks one.
    #[must_use]
    pub fn for_method(self, label: &str) -> Self {
        match self {
            Self::WeatherCoverage {
                at,
                lat,
                lon,
                method: None,
            } => Self::WeatherCoverage {
                at,
                lat,
                lon,
                method: Some(label.to_string()),
            },
            other => other,
        }
    }
}

/// Convenience result alias.
pub type SimResult<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_distribution_mismatch_names_facility_and_category() {
        let err = SimError::DistributionMismatch {
            distribution: "leak rate".to_string(),
            facility: "well-17".to_string(),
            attribute: "subtype_code".to_string(),
            category: "9".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("well-17"));
        assert!(msg.contains("subtype_code='9'"));
    }

    #[test]
    fn test_weather_coverage_gains_method_context() {
        let at = NaiveDate::from_ymd_opt(2019, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let err = SimError::WeatherCoverage {
            at,
            lat: 51.0,
            lon: -114.0,
            method: None,
        }
        .for_method("OGI");
        let msg = err.to_string();
        assert!(msg.contains("2019-03-01"));
        assert!(msg.contains("method 'OGI'"));
    }
}
