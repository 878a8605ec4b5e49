//! Go/no-go decision for a method at a site on a given day

use crate::config::method::WeatherLimits;
use crate::core_types::facility::GeoPoint;
use crate::error::SimResult;
use crate::weather::lookup::{WeatherLookup, WeatherSample};
use chrono::{NaiveDate, NaiveDateTime};

/// Hour of day at which a method's weather window is checked
pub const SURVEY_CHECK_HOUR: u32 = 8;

/// Why a site was not workable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Go,
    Blocked(WeatherSample),
}

impl GateOutcome {
    pub fn is_go(&self) -> bool {
        matches!(self, GateOutcome::Go)
    }
}

/// Weather envelope of one method
#[derive(Debug, Clone, Copy)]
pub struct WeatherGate {
    limits: WeatherLimits,
    enabled: bool,
}

impl WeatherGate {
    pub fn new(limits: WeatherLimits, enabled: bool) -> Self {
        Self { limits, enabled }
    }

    /// True when `sample` lies inside the operating envelope (bounds inclusive)
    pub fn within_limits(&self, sample: &WeatherSample) -> bool {
        let l = &self.limits;
        sample.temp_c >= l.min_temp_c
            && sample.temp_c <= l.max_temp_c
            && sample.wind_mps <= l.max_wind_mps
            && sample.precip_mm <= l.max_precip_mm
    }

    /// Decide whether the method can work at `location` on `date`.
    ///
    /// With weather disabled this never touches the lookup.
    pub fn check(
        &self,
        weather: &dyn WeatherLookup,
        location: GeoPoint,
        date: NaiveDate,
    ) -> SimResult<GateOutcome> {
        if !self.enabled {
            return Ok(GateOutcome::Go);
        }
        let at = check_time(date);
        let sample = weather.lookup(location.lat, location.lon, at)?;
        Ok(if self.within_limits(&sample) {
            GateOutcome::Go
        } else {
            GateOutcome::Blocked(sample)
        })
    }
}

fn check_time(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(SURVEY_CHECK_HOUR, 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::lookup::ConstantWeather;

    fn limits() -> WeatherLimits {
        WeatherLimits {
            min_temp_c: -20.0,
            max_temp_c: 40.0,
            max_wind_mps: 10.0,
            max_precip_mm: 1.0,
        }
    }

    #[test]
    fn test_envelope_bounds_are_inclusive() {
        let gate = WeatherGate::new(limits(), true);
        assert!(gate.within_limits(&WeatherSample::new(-20.0, 10.0, 1.0)));
        assert!(!gate.within_limits(&WeatherSample::new(-20.1, 5.0, 0.0)));
        assert!(!gate.within_limits(&WeatherSample::new(10.0, 10.5, 0.0)));
        assert!(!gate.within_limits(&WeatherSample::new(10.0, 5.0, 1.2)));
    }

    #[test]
    fn test_disabled_gate_always_goes() {
        let storm = ConstantWeather(WeatherSample::new(-50.0, 40.0, 30.0));
        let date = NaiveDate::from_ymd_opt(2019, 1, 15).unwrap();
        let loc = GeoPoint::new(51.0, -114.0);
        assert!(WeatherGate::new(limits(), false)
            .check(&storm, loc, date)
            .unwrap()
            .is_go());
        assert!(!WeatherGate::new(limits(), true)
            .check(&storm, loc, date)
            .unwrap()
            .is_go());
    }
}
