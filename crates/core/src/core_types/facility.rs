//! Facilities (sites) and their per-method survey requirements

use crate::core_types::ids::FacilityId;
use crate::core_types::units::Kilometers;
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Haversine great-circle distance
    #[must_use]
    pub fn distance_to(&self, other: &GeoPoint) -> Kilometers {
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Kilometers::new(EARTH_RADIUS_KM * c)
    }
}

/// Survey requirements of one facility for one method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteMethodParams {
    /// Required surveys per calendar year
    pub surveys_per_year: u32,
    /// Minutes on site to complete one survey
    pub survey_minutes: f64,
    /// Minimum days between two surveys of this site
    pub min_interval_days: u32,
}

/// Immutable facility description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    /// Assigned when the replicate's facility set is built
    #[serde(skip)]
    pub id: FacilityId,
    /// Name from the infrastructure input (may repeat after resampling)
    pub name: String,
    pub location: GeoPoint,
    /// Categorical attributes (subtype code, production type, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default = "default_equipment_groups")]
    pub equipment_groups: u32,
    #[serde(default)]
    pub fixed_sensors: u32,
    /// Per-method overrides keyed by method label
    #[serde(default)]
    pub method_params: BTreeMap<String, SiteMethodParams>,
}

fn default_equipment_groups() -> u32 {
    1
}

impl Facility {
    /// Create a facility with one equipment group and no overrides
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: FacilityId(0),
            name: name.into(),
            location: GeoPoint::new(lat, lon),
            attributes: BTreeMap::new(),
            equipment_groups: 1,
            fixed_sensors: 0,
            method_params: BTreeMap::new(),
        }
    }

    /// Builder: set a categorical attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder: set survey requirements for a method label
    pub fn with_method_params(mut self, label: impl Into<String>, params: SiteMethodParams) -> Self {
        self.method_params.insert(label.into(), params);
        self
    }

    /// Builder: set the number of equipment groups
    pub fn with_equipment_groups(mut self, groups: u32) -> Self {
        self.equipment_groups = groups.max(1);
        self
    }

    /// Builder: set the number of fixed sensors installed on site
    pub fn with_fixed_sensors(mut self, sensors: u32) -> Self {
        self.fixed_sensors = sensors;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Build the facility set of one replicate.
///
/// With `samples = Some(n)` the input list is resampled `n` times with
/// replacement. The result is shuffled once so that sites with equal survey
/// priority are visited in a random but reproducible order, then ids are
/// assigned by position.
pub fn sample_facilities(
    input: &[Facility],
    samples: Option<usize>,
    rng: &mut RandomSource,
) -> Vec<Facility> {
    let mut facilities: Vec<Facility> = match samples {
        Some(n) if !input.is_empty() => (0..n)
            .map(|_| input[rng.index(input.len())].clone())
            .collect(),
        _ => input.to_vec(),
    };
    rng.shuffle(&mut facilities);
    for (idx, facility) in facilities.iter_mut().enumerate() {
        facility.id = FacilityId(idx as u32);
    }
    facilities
}
