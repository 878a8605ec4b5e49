//! Semantic unit types for emission rates and distances
//!
//! Emission rates flow through sampling, detection, ranking and reporting, and
//! mixing g/s with kg/day silently skews every comparative result. Rates are
//! therefore carried as [`GramsPerSecond`] and only converted at the edges.
//!
//! # Usage
//! ```
//! use ldar_sim_core::core_types::units::{GramsPerSecond, KilogramsPerDay};
//!
//! let rate = GramsPerSecond::new(1.0);
//! let daily: KilogramsPerDay = rate.into();
//! assert!((*daily - 86.4).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Deref, Div, Mul};

/// Seconds in one day divided by grams per kilogram.
const GPS_TO_KG_PER_DAY: f64 = 86.4;

/// Compare f64 values with total ordering using Rust's built-in `total_cmp`
#[inline]
fn f64_total_cmp(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

// ============================================================================
// EMISSION RATES
// ============================================================================

/// Emission rate in grams per second
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GramsPerSecond(f64);

impl Eq for GramsPerSecond {}

impl PartialOrd for GramsPerSecond {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GramsPerSecond {
    fn cmp(&self, other: &Self) -> Ordering {
        f64_total_cmp(self.0, other.0)
    }
}

impl Deref for GramsPerSecond {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl GramsPerSecond {
    /// Zero emissions
    pub const ZERO: Self = GramsPerSecond(0.0);

    /// Create a new rate. Negative inputs are clamped to zero.
    #[inline]
    #[must_use]
    pub fn new(value: f64) -> Self {
        GramsPerSecond(value.max(0.0))
    }

    /// Get the raw f64 value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Cap the rate at `max`
    #[inline]
    #[must_use]
    pub fn capped(self, max: GramsPerSecond) -> Self {
        GramsPerSecond(self.0.min(max.0))
    }
}

impl From<f64> for GramsPerSecond {
    fn from(v: f64) -> Self {
        GramsPerSecond::new(v)
    }
}

impl fmt::Display for GramsPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5} g/s", self.0)
    }
}

impl Add for GramsPerSecond {
    type Output = GramsPerSecond;
    fn add(self, rhs: GramsPerSecond) -> GramsPerSecond {
        GramsPerSecond(self.0 + rhs.0)
    }
}

impl AddAssign for GramsPerSecond {
    fn add_assign(&mut self, rhs: GramsPerSecond) {
        self.0 += rhs.0;
    }
}

impl Mul<f64> for GramsPerSecond {
    type Output = GramsPerSecond;
    fn mul(self, rhs: f64) -> GramsPerSecond {
        GramsPerSecond::new(self.0 * rhs)
    }
}

impl Div<f64> for GramsPerSecond {
    type Output = GramsPerSecond;
    fn div(self, rhs: f64) -> GramsPerSecond {
        GramsPerSecond::new(self.0 / rhs)
    }
}

impl Sum for GramsPerSecond {
    fn sum<I: Iterator<Item = GramsPerSecond>>(iter: I) -> Self {
        iter.fold(GramsPerSecond::ZERO, Add::add)
    }
}

/// Emitted mass per simulated day
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct KilogramsPerDay(f64);

impl Deref for KilogramsPerDay {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl From<GramsPerSecond> for KilogramsPerDay {
    fn from(rate: GramsPerSecond) -> Self {
        KilogramsPerDay(rate.0 * GPS_TO_KG_PER_DAY)
    }
}

impl fmt::Display for KilogramsPerDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} kg/day", self.0)
    }
}

// ============================================================================
// DISTANCE
// ============================================================================

/// Great-circle distance in kilometers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilometers(f64);

impl Eq for Kilometers {}

impl PartialOrd for Kilometers {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Kilometers {
    fn cmp(&self, other: &Self) -> Ordering {
        f64_total_cmp(self.0, other.0)
    }
}

impl Deref for Kilometers {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl Kilometers {
    #[inline]
    #[must_use]
    pub fn new(value: f64) -> Self {
        Kilometers(value.max(0.0))
    }

    /// Minutes needed to cover this distance at `speed_kmh`.
    #[inline]
    #[must_use]
    pub fn travel_minutes(self, speed_kmh: f64) -> f64 {
        if speed_kmh <= 0.0 {
            return f64::INFINITY;
        }
        self.0 / speed_kmh * 60.0
    }
}

impl Add for Kilometers {
    type Output = Kilometers;
    fn add(self, rhs: Kilometers) -> Kilometers {
        Kilometers(self.0 + rhs.0)
    }
}

impl fmt::Display for Kilometers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} km", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rates_are_never_negative() {
        assert_eq!(GramsPerSecond::new(-3.0), GramsPerSecond::ZERO);
        assert_eq!(GramsPerSecond::new(2.0) * -1.0, GramsPerSecond::ZERO);
    }

    #[test]
    fn test_cap_and_ordering() {
        let max = GramsPerSecond::new(5.0);
        assert_eq!(GramsPerSecond::new(7.5).capped(max), max);
        let mut rates = vec![
            GramsPerSecond::new(0.3),
            GramsPerSecond::new(2.0),
            GramsPerSecond::new(0.01),
        ];
        rates.sort();
        assert_eq!(*rates[0], 0.01);
        assert_eq!(*rates[2], 2.0);
    }

    #[test]
    fn test_daily_mass_conversion() {
        let total: GramsPerSecond = [0.5, 0.25].into_iter().map(GramsPerSecond::new).sum();
        let daily = KilogramsPerDay::from(total);
        assert_relative_eq!(*daily, 64.8, epsilon = 1e-9);
    }

    #[test]
    fn test_travel_minutes() {
        assert_relative_eq!(Kilometers::new(30.0).travel_minutes(60.0), 30.0);
        assert!(Kilometers::new(1.0).travel_minutes(0.0).is_infinite());
    }
}
