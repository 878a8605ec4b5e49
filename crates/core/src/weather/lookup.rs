//! Weather lookup service and the built-in providers
//!
//! The engine only ever asks for a single point value: no interpolation in
//! space or time happens here. Providers state the date range they cover so a
//! replicate can be rejected before its first simulated day.

use crate::core_types::facility::GeoPoint;
use crate::error::{SimError, SimResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Conditions at one location and timestamp
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherSample {
    pub temp_c: f64,
    pub wind_mps: f64,
    pub precip_mm: f64,
}

impl WeatherSample {
    pub const fn new(temp_c: f64, wind_mps: f64, precip_mm: f64) -> Self {
        Self {
            temp_c,
            wind_mps,
            precip_mm,
        }
    }
}

/// Point-in-time weather service shared read-only by all replicates
pub trait WeatherLookup: Send + Sync {
    /// Conditions at `(lat, lon)` at `at`
    fn lookup(&self, lat: f64, lon: f64, at: NaiveDateTime) -> SimResult<WeatherSample>;

    /// Inclusive date range covered; `None` means unbounded
    fn coverage(&self) -> Option<(NaiveDate, NaiveDate)>;

    /// Fail unless `[start, end]` lies inside the covered range
    fn ensure_covers(&self, start: NaiveDate, end: NaiveDate, at: GeoPoint) -> SimResult<()> {
        let Some((first, last)) = self.coverage() else {
            return Ok(());
        };
        let outside = if start < first {
            Some(start)
        } else if end > last {
            Some(end)
        } else {
            None
        };
        match outside {
            Some(date) => Err(SimError::WeatherCoverage {
                at: date.and_hms_opt(0, 0, 0).unwrap_or_default(),
                lat: at.lat,
                lon: at.lon,
                method: None,
            }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// CONSTANT
// ============================================================================

/// Same conditions everywhere, every day
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstantWeather(pub WeatherSample);

impl WeatherLookup for ConstantWeather {
    fn lookup(&self, _lat: f64, _lon: f64, _at: NaiveDateTime) -> SimResult<WeatherSample> {
        Ok(self.0)
    }

    fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        None
    }
}

// ============================================================================
// SEASONAL
// ============================================================================

/// Climatological weather from monthly normals with a diurnal temperature cycle
///
/// Temperature moves from the monthly minimum at 06:00 to the maximum at 14:00
/// along a sine curve and stays at the minimum overnight. Wind and
/// precipitation are monthly means. Location is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalWeather {
    pub name: String,
    /// `(min, max)` temperature in °C, indexed Jan = 0
    pub monthly_temps: [(f64, f64); 12],
    pub monthly_wind_mps: [f64; 12],
    pub monthly_precip_mm: [f64; 12],
}

impl SeasonalWeather {
    /// Southern Alberta normals
    pub fn alberta() -> Self {
        Self {
            name: "Alberta".to_string(),
            monthly_temps: [
                (-13.2, -1.0), // Jan
                (-11.6, 0.9),  // Feb
                (-7.0, 4.8),   // Mar
                (-1.5, 11.3),  // Apr
                (4.0, 16.5),   // May
                (8.3, 20.5),   // Jun
                (10.8, 23.6),  // Jul
                (9.8, 23.0),   // Aug
                (4.9, 18.2),   // Sep
                (-0.9, 11.9),  // Oct
                (-8.0, 3.5),   // Nov
                (-12.3, -0.5), // Dec
            ],
            monthly_wind_mps: [4.6, 4.4, 4.5, 4.9, 4.6, 4.1, 3.7, 3.7, 4.0, 4.5, 4.6, 4.6],
            monthly_precip_mm: [0.3, 0.3, 0.6, 0.8, 1.9, 3.1, 2.2, 1.6, 1.5, 0.4, 0.4, 0.3],
        }
    }

    /// Temperature at `at` following the diurnal cycle
    pub fn temperature(&self, at: NaiveDateTime) -> f64 {
        let (min_temp, max_temp) = self.monthly_temps[at.month0() as usize];
        let hour = f64::from(at.hour()) + f64::from(at.minute()) / 60.0;
        // sin reaches 1.0 at 14:00 with a 16 hour period
        let hour_factor = ((hour - 6.0) * std::f64::consts::PI / 16.0).sin().max(0.0);
        min_temp + (max_temp - min_temp) * hour_factor
    }
}

impl WeatherLookup for SeasonalWeather {
    fn lookup(&self, _lat: f64, _lon: f64, at: NaiveDateTime) -> SimResult<WeatherSample> {
        let month = at.month0() as usize;
        Ok(WeatherSample {
            temp_c: self.temperature(at),
            wind_mps: self.monthly_wind_mps[month],
            precip_mm: self.monthly_precip_mm[month],
        })
    }

    fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        None
    }
}

// ============================================================================
// GRIDDED DAILY TABLE
// ============================================================================

/// Daily values on a regular lat/lon grid, looked up at the nearest cell
///
/// Values are stored day-major, then row (latitude), then column (longitude).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeatherTableRecord")]
pub struct DailyWeatherTable {
    pub first_day: NaiveDate,
    /// Centre of the south-west cell
    pub origin: GeoPoint,
    pub cell_deg: f64,
    pub rows: usize,
    pub cols: usize,
    values: Vec<WeatherSample>,
}

/// Serialized form of [`DailyWeatherTable`]; checked through `new` on load
#[derive(Deserialize)]
struct WeatherTableRecord {
    first_day: NaiveDate,
    origin: GeoPoint,
    cell_deg: f64,
    rows: usize,
    cols: usize,
    values: Vec<WeatherSample>,
}

impl TryFrom<WeatherTableRecord> for DailyWeatherTable {
    type Error = SimError;

    fn try_from(r: WeatherTableRecord) -> SimResult<Self> {
        Self::new(r.first_day, r.origin, r.cell_deg, r.rows, r.cols, r.values)
    }
}

impl DailyWeatherTable {
    /// Build a table; `values.len()` must be a multiple of `rows * cols`
    pub fn new(
        first_day: NaiveDate,
        origin: GeoPoint,
        cell_deg: f64,
        rows: usize,
        cols: usize,
        values: Vec<WeatherSample>,
    ) -> SimResult<Self> {
        let cells = rows * cols;
        if cells == 0 || cell_deg <= 0.0 {
            return Err(SimError::config("weather table", "grid must have cells of positive size"));
        }
        if values.is_empty() || values.len() % cells != 0 {
            return Err(SimError::config(
                "weather table",
                format!("{} values do not fill whole days of {cells} cells", values.len()),
            ));
        }
        Ok(Self {
            first_day,
            origin,
            cell_deg,
            rows,
            cols,
            values,
        })
    }

    /// A table with one cell covering every location
    pub fn single_cell(first_day: NaiveDate, at: GeoPoint, days: Vec<WeatherSample>) -> SimResult<Self> {
        Self::new(first_day, at, 360.0, 1, 1, days)
    }

    pub fn days(&self) -> usize {
        self.values
            .len()
            .checked_div(self.rows * self.cols)
            .unwrap_or(0)
    }

    fn cell(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        if self.rows == 1 && self.cols == 1 {
            return Some((0, 0));
        }
        let row = ((lat - self.origin.lat) / self.cell_deg).round();
        let col = ((lon - self.origin.lon) / self.cell_deg).round();
        if row < 0.0 || col < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }
}

impl WeatherLookup for DailyWeatherTable {
    fn lookup(&self, lat: f64, lon: f64, at: NaiveDateTime) -> SimResult<WeatherSample> {
        let coverage_error = || SimError::WeatherCoverage {
            at,
            lat,
            lon,
            method: None,
        };
        let day = (at.date() - self.first_day).num_days();
        if day < 0 || day as usize >= self.days() {
            return Err(coverage_error());
        }
        let (row, col) = self.cell(lat, lon).ok_or_else(coverage_error)?;
        let idx = (day as usize * self.rows + row) * self.cols + col;
        self.values.get(idx).copied().ok_or_else(coverage_error)
    }

    fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        let days = self.days();
        if days == 0 {
            return Some((self.first_day, self.first_day - chrono::Duration::days(1)));
        }
        let last = self.first_day + chrono::Duration::days(days as i64 - 1);
        Some((self.first_day, last))
    }
}
