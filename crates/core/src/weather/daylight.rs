//! Daylight hours from the sunrise equation
//!
//! Uses the solar declination approximation
//! `δ = -23.44° · cos(360° / 365 · (N + 10))` and the hour angle at sunrise
//! `cos(ω₀) = -tan(φ) · tan(δ)`. Polar day and night clamp to 24 and 0 hours.

use chrono::{Datelike, NaiveDate};

/// Axial tilt in degrees
const AXIAL_TILT_DEG: f64 = 23.44;

/// Hours between sunrise and sunset at `lat` on `date`
pub fn daylight_hours(lat: f64, date: NaiveDate) -> f64 {
    let day_of_year = f64::from(date.ordinal());
    let declination = (-AXIAL_TILT_DEG
        * (360.0 / 365.0 * (day_of_year + 10.0)).to_radians().cos())
    .to_radians();
    let cos_hour_angle = -(lat.to_radians().tan()) * declination.tan();
    if cos_hour_angle <= -1.0 {
        return 24.0;
    }
    if cos_hour_angle >= 1.0 {
        return 0.0;
    }
    let hour_angle_deg = cos_hour_angle.acos().to_degrees();
    2.0 * hour_angle_deg / 15.0
}

/// Hours a crew may work: the daylight-trimmed workday
pub fn available_work_hours(
    consider_daylight: bool,
    max_workday_hours: f64,
    lat: f64,
    date: NaiveDate,
) -> f64 {
    if consider_daylight {
        daylight_hours(lat, date).min(max_workday_hours)
    } else {
        max_workday_hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, m, d).unwrap()
    }

    #[test]
    fn test_equator_has_twelve_hours() {
        let hours = daylight_hours(0.0, date(3, 21));
        assert!((hours - 12.0).abs() < 0.1, "{hours}");
    }

    #[test]
    fn test_calgary_solstices() {
        let summer = daylight_hours(51.0, date(6, 21));
        let winter = daylight_hours(51.0, date(12, 21));
        assert!(summer > 16.0 && summer < 17.0, "{summer}");
        assert!(winter > 7.5 && winter < 8.5, "{winter}");
    }

    #[test]
    fn test_polar_extremes() {
        assert_eq!(daylight_hours(80.0, date(6, 21)), 24.0);
        assert_eq!(daylight_hours(80.0, date(12, 21)), 0.0);
    }

    #[test]
    fn test_workday_trimmed_by_daylight() {
        assert_eq!(available_work_hours(false, 10.0, 51.0, date(12, 21)), 10.0);
        let trimmed = available_work_hours(true, 10.0, 51.0, date(12, 21));
        assert!(trimmed < 10.0);
        assert_eq!(available_work_hours(true, 8.0, 51.0, date(6, 21)), 8.0);
    }
}
