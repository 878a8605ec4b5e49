//! Leak entity and its lifecycle state

use crate::core_types::ids::{DetectionSource, FacilityId, LeakId, MethodId};
use crate::core_types::units::GramsPerSecond;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a leak still held by the pool
///
/// Repaired leaks leave the pool, so only these two states are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeakState {
    /// Emitting and not yet found
    Active,
    /// Found and owned by a repair ticket; still emitting until repaired
    Tagged,
}

/// A single fugitive emission source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leak {
    pub id: LeakId,
    pub facility: FacilityId,
    /// Equipment group within the facility, `0..equipment_groups`
    pub equipment_group: u32,
    /// True emission rate, fixed at creation
    pub rate: GramsPerSecond,
    /// First day the leak emits (back-dated for initial leaks)
    pub created: NaiveDate,
    pub state: LeakState,
    pub tagged_on: Option<NaiveDate>,
    pub tagged_by: Option<DetectionSource>,
    /// Screening method whose flag led to this leak being found
    pub initially_detected_by: Option<MethodId>,
}

impl Leak {
    pub fn new(
        id: LeakId,
        facility: FacilityId,
        equipment_group: u32,
        rate: GramsPerSecond,
        created: NaiveDate,
    ) -> Self {
        Self {
            id,
            facility,
            equipment_group,
            rate,
            created,
            state: LeakState::Active,
            tagged_on: None,
            tagged_by: None,
            initially_detected_by: None,
        }
    }

    #[inline]
    pub fn is_tagged(&self) -> bool {
        self.state == LeakState::Tagged
    }

    /// Whole days the leak has been emitting as of `today`
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.created).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_counts_back_dated_days() {
        let created = NaiveDate::from_ymd_opt(2016, 12, 22).unwrap();
        let leak = Leak::new(LeakId(1), FacilityId(0), 0, GramsPerSecond::new(0.1), created);
        let today = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        assert_eq!(leak.age_days(today), 10);
        assert!(!leak.is_tagged());
    }
}
