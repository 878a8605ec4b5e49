//! Route planning for mobile crews
//!
//! Crews with route planning pick the nearest remaining site by great-circle
//! distance and drive at a speed sampled per leg. At the end of the day they
//! retire to the nearest home base. Without route planning, legs cost a
//! transit time drawn from the method's transit distribution and sites are
//! taken in priority order.

use crate::config::method::TravelConfig;
use crate::core_types::facility::{Facility, GeoPoint};
use crate::core_types::units::Kilometers;
use crate::random::RandomSource;

/// Chosen next stop for a crew
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    /// Position of the chosen site within the candidate slice
    pub candidate: usize,
    pub travel_minutes: f64,
    pub distance: Option<Kilometers>,
}

/// Next-site selection and travel time for one method
#[derive(Debug, Clone)]
pub struct RoutePlanner {
    travel: TravelConfig,
}

impl RoutePlanner {
    pub fn new(travel: TravelConfig) -> Self {
        Self { travel }
    }

    pub fn route_planning(&self) -> bool {
        self.travel.route_planning
    }

    /// Where crews stand on the first morning
    pub fn initial_location(&self, fallback: GeoPoint) -> GeoPoint {
        self.travel
            .crew_init_location
            .or_else(|| self.travel.home_bases.first().copied())
            .unwrap_or(fallback)
    }

    /// Choose the next site among `candidates` (given in priority order).
    ///
    /// Returns `None` for an empty candidate list.
    pub fn next_leg(
        &self,
        from: GeoPoint,
        candidates: &[&Facility],
        rng: &mut RandomSource,
    ) -> Option<Leg> {
        if candidates.is_empty() {
            return None;
        }
        if !self.travel.route_planning {
            return Some(Leg {
                candidate: 0,
                travel_minutes: self.travel.transit_minutes.sample(rng).max(0.0),
                distance: None,
            });
        }
        // Nearest site; ties keep the earlier (higher priority) candidate
        let (candidate, distance) = candidates
            .iter()
            .enumerate()
            .map(|(idx, f)| (idx, from.distance_to(&f.location)))
            .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))?;
        let speed = self.sample_speed(rng);
        Some(Leg {
            candidate,
            travel_minutes: distance.travel_minutes(speed),
            distance: Some(distance),
        })
    }

    /// Where a crew ends the day: the nearest home base, or where it stands
    pub fn end_of_day(&self, at: GeoPoint) -> GeoPoint {
        if !self.travel.route_planning {
            return at;
        }
        self.travel
            .home_bases
            .iter()
            .min_by(|a, b| at.distance_to(a).cmp(&at.distance_to(b)))
            .copied()
            .unwrap_or(at)
    }

    fn sample_speed(&self, rng: &mut RandomSource) -> f64 {
        rng.choose(&self.travel.speed_list).copied().unwrap_or(0.0)
    }
}
