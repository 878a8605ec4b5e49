//! Core types and utilities

pub mod facility;
pub mod ids;
pub mod units;

pub use facility::{sample_facilities, Facility, GeoPoint, SiteMethodParams};
pub use ids::{CrewId, DetectionSource, FacilityId, LeakId, MethodId};
pub use units::{GramsPerSecond, Kilometers, KilogramsPerDay};
