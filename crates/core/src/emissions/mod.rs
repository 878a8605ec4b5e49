//! Leak lifecycle storage and generation

pub mod generator;
pub mod leak;
pub mod pool;

pub use generator::LeakGenerator;
pub use leak::{Leak, LeakState};
pub use pool::{LeakPool, SiteEmissionState, TagOutcome};
