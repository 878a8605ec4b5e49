//! Typed identifiers for simulation entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a facility within one replicate's facility set
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FacilityId(pub u32);

impl FacilityId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{:05}", self.0)
    }
}

/// Monotonic leak identifier, unique within a replicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeakId(pub u64);

impl fmt::Display for LeakId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{:010}", self.0)
    }
}

/// Position of a method in the program's method list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u16);

impl MethodId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Crew (or fixed sensor, or satellite) index within its method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrewId(pub u32);

/// Who found a leak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    /// A deployed LDAR method
    Method(MethodId),
    /// Weekly operator walk-around
    Operator,
    /// Leak reached the natural repair horizon
    Natural,
}
