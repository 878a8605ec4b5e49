//! LDAR Simulation Core Library
//!
//! Estimates the methane-emission outcomes of competing leak detection and
//! repair (LDAR) programs. Each replicate simulates, day by day, the birth,
//! detection and repair of leaks across a facility portfolio under several
//! concurrently deployed detection methods (survey crews, fixed sensors,
//! satellites).
//!
//! ## Engine
//!
//! - Leak lifecycle: emergence, detection, follow-up triage, reporting, repair
//! - Capacity-constrained scheduling with weather, daylight, routing and
//!   multi-day survey continuation
//! - Sensor models with quantification error and threshold/ratio triage
//! - Append-only event ledger and daily snapshots as the only output channel

// Core types and utilities
pub mod core_types;
pub mod error;
pub mod random;

// Configuration and input distributions
pub mod config;
pub mod distribution;

// Simulation components
pub mod emissions;
pub mod methods;
pub mod operator;
pub mod repair;
pub mod weather;

// Replicate loop and batch driver
pub mod simulation;

// Re-export core types
pub use core_types::{
    sample_facilities, CrewId, DetectionSource, Facility, FacilityId, GeoPoint, GramsPerSecond,
    Kilometers, KilogramsPerDay, LeakId, MethodId, SiteMethodParams,
};
pub use error::{SimError, SimResult};
pub use random::RandomSource;

// Re-export configuration
pub use config::{
    DeploymentType, DetectionModel, EmissionsConfig, FollowUpThreshold, MeasurementScale,
    MethodConfig, MethodLibrary, OperatorConfig, ProgramConfig, RedundancyFilter, RepairConfig,
    SensorConfig,
};
pub use distribution::{InitialLeakCount, RateDistribution, ScalarSource};

// Re-export simulation types
pub use simulation::{
    run_batch, Campaign, CostCategory, Counters, DailySnapshot, Event, EventKind, Simulation,
    SimulationInputs, SimulationOutput,
};
pub use weather::{ConstantWeather, DailyWeatherTable, SeasonalWeather, WeatherLookup, WeatherSample};
