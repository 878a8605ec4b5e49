//! Crews and resumable survey tasks

use crate::core_types::facility::GeoPoint;
use crate::core_types::ids::{CrewId, FacilityId, MethodId};
use chrono::NaiveDate;

/// A site survey that did not fit into one workday
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyTask {
    pub method: MethodId,
    pub crew: CrewId,
    pub facility: FacilityId,
    pub started: NaiveDate,
    pub remaining_minutes: f64,
}

impl SurveyTask {
    /// Spend up to `available` minutes; returns the minutes actually used
    pub fn work(&mut self, available: f64) -> f64 {
        let used = self.remaining_minutes.min(available.max(0.0));
        self.remaining_minutes -= used;
        used
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_minutes <= 0.0
    }
}

/// One field crew (or sensor unit) of a method
#[derive(Debug, Clone, PartialEq)]
pub struct Crew {
    pub id: CrewId,
    pub location: GeoPoint,
    /// Survey carried over from a previous day; resumed before anything else
    pub task: Option<SurveyTask>,
}

impl Crew {
    pub fn new(id: CrewId, location: GeoPoint) -> Self {
        Self {
            id,
            location,
            task: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_spans_days() {
        let mut task = SurveyTask {
            method: MethodId(0),
            crew: CrewId(0),
            facility: FacilityId(3),
            started: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            remaining_minutes: 600.0,
        };
        assert_eq!(task.work(480.0), 480.0);
        assert!(!task.is_complete());
        assert_eq!(task.work(480.0), 120.0);
        assert!(task.is_complete());
    }
}
