//! Detection methods: scheduling, crews, routing, sensors and follow-up triage

pub mod crew;
pub mod followup;
pub mod route;
pub mod schedule;
pub mod scheduler;
pub mod sensor;

pub use crew::{Crew, SurveyTask};
pub use followup::{CandidateFlag, FlagBoard, FlagTarget, FollowUpSelector, Selection, SiteFlag, TriagePolicy};
pub use route::{Leg, RoutePlanner};
pub use schedule::{DeploymentCalendar, MethodSchedule, QuotaShortfall, SiteSchedule};
pub use scheduler::{DayContext, MethodDay, MethodScheduler};
pub use sensor::{normal_cdf, DetectionEngine, SiteMeasurement, SurveyOutcome};
