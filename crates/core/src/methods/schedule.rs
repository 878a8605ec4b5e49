//! Per-site survey bookkeeping of one method
//!
//! Tracks when each facility was last surveyed, how many surveys it received
//! this calendar year and whether a crew currently holds it mid-survey.

use crate::config::method::MethodConfig;
use crate::core_types::facility::{Facility, SiteMethodParams};
use crate::core_types::ids::{CrewId, FacilityId};
use chrono::{Datelike, NaiveDate};

/// Survey state of one facility for one method
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSchedule {
    pub params: SiteMethodParams,
    pub last_survey: Option<NaiveDate>,
    pub surveys_this_year: u32,
    /// Crew holding an unfinished survey of this site
    pub in_progress_by: Option<CrewId>,
    /// Missed surveys are reported at year end
    pub quota_tracked: bool,
}

impl SiteSchedule {
    pub fn new(params: SiteMethodParams) -> Self {
        Self {
            params,
            last_survey: None,
            surveys_this_year: 0,
            in_progress_by: None,
            quota_tracked: true,
        }
    }

    /// Quota left and minimum interval elapsed
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.surveys_this_year < self.params.surveys_per_year
            && self.days_since_survey(today) >= i64::from(self.params.min_interval_days)
    }

    /// Days since the last completed survey; never surveyed sorts first
    pub fn days_since_survey(&self, today: NaiveDate) -> i64 {
        self.last_survey
            .map_or(i64::MAX, |last| (today - last).num_days())
    }

    pub fn record_survey(&mut self, today: NaiveDate) {
        self.last_survey = Some(today);
        self.surveys_this_year += 1;
        self.in_progress_by = None;
    }
}

/// Years and months in which a method may deploy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentCalendar {
    years: Vec<i32>,
    months: Vec<u32>,
}

impl DeploymentCalendar {
    pub fn new(years: Vec<i32>, months: Vec<u32>) -> Self {
        Self { years, months }
    }

    pub fn is_active(&self, date: NaiveDate) -> bool {
        (self.years.is_empty() || self.years.contains(&date.year()))
            && (self.months.is_empty() || self.months.contains(&date.month()))
    }
}

/// A facility below its survey quota when a year closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaShortfall {
    pub facility: FacilityId,
    pub completed: u32,
    pub required: u32,
}

/// All site schedules of one method, indexed by facility
#[derive(Debug, Clone)]
pub struct MethodSchedule {
    sites: Vec<SiteSchedule>,
    calendar: DeploymentCalendar,
}

impl MethodSchedule {
    /// Facilities without an override for `method.label` use the method defaults
    pub fn new(method: &MethodConfig, facilities: &[Facility]) -> Self {
        let sites = facilities
            .iter()
            .map(|f| {
                let params = f
                    .method_params
                    .get(&method.label)
                    .copied()
                    .unwrap_or(method.site_defaults);
                SiteSchedule::new(params)
            })
            .collect();
        Self {
            sites,
            calendar: DeploymentCalendar::new(
                method.deployment_years.clone(),
                method.deployment_months.clone(),
            ),
        }
    }

    pub fn site(&self, facility: FacilityId) -> &SiteSchedule {
        &self.sites[facility.index()]
    }

    pub fn site_mut(&mut self, facility: FacilityId) -> &mut SiteSchedule {
        &mut self.sites[facility.index()]
    }

    /// Stop reporting quota misses for a site the method is never assigned
    pub fn waive_quota(&mut self, facility: FacilityId) {
        if let Some(site) = self.sites.get_mut(facility.index()) {
            site.quota_tracked = false;
        }
    }

    pub fn is_deployable(&self, date: NaiveDate) -> bool {
        self.calendar.is_active(date)
    }

    /// Due sites not held by another crew, most overdue first.
    ///
    /// Ties keep facility order, which is shuffled once per replicate.
    pub fn due_sites(&self, today: NaiveDate) -> Vec<FacilityId> {
        if !self.is_deployable(today) {
            return Vec::new();
        }
        let mut due: Vec<(i64, FacilityId)> = self
            .sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_progress_by.is_none() && s.is_due(today))
            .map(|(idx, s)| (s.days_since_survey(today), FacilityId(idx as u32)))
            .collect();
        due.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Close the survey year: report tracked sites below quota and reset counters
    pub fn close_year(&mut self) -> Vec<QuotaShortfall> {
        let mut missed = Vec::new();
        for (idx, site) in self.sites.iter_mut().enumerate() {
            if site.quota_tracked && site.surveys_this_year < site.params.surveys_per_year {
                missed.push(QuotaShortfall {
                    facility: FacilityId(idx as u32),
                    completed: site.surveys_this_year,
                    required: site.params.surveys_per_year,
                });
            }
            site.surveys_this_year = 0;
        }
        missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params(per_year: u32, interval: u32) -> SiteMethodParams {
        SiteMethodParams {
            surveys_per_year: per_year,
            survey_minutes: 60.0,
            min_interval_days: interval,
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, m, d).unwrap()
    }

    #[test]
    fn test_interval_and_quota() {
        let mut site = SiteSchedule::new(params(2, 30));
        assert!(site.is_due(date(1, 1)));
        site.record_survey(date(1, 1));
        assert!(!site.is_due(date(1, 30)));
        assert!(site.is_due(date(1, 31)));
        site.record_survey(date(1, 31));
        assert!(!site.is_due(date(6, 1)));
    }

    #[test]
    fn test_due_sites_most_overdue_first() {
        let method = MethodConfig::ogi("OGI").with_site_defaults(params(10, 0));
        let facilities: Vec<_> = (0..4).map(|i| Facility::new(format!("s{i}"), 50.0, -110.0)).collect();
        let mut schedule = MethodSchedule::new(&method, &facilities);
        let today = date(3, 1);
        schedule.site_mut(FacilityId(0)).record_survey(today - Duration::days(1));
        schedule.site_mut(FacilityId(1)).record_survey(today - Duration::days(20));
        schedule.site_mut(FacilityId(2)).in_progress_by = Some(CrewId(0));
        let due = schedule.due_sites(today);
        assert_eq!(due, vec![FacilityId(3), FacilityId(1), FacilityId(0)]);
    }

    #[test]
    fn test_calendar_restricts_deployment() {
        let mut method = MethodConfig::ogi("OGI");
        method.deployment_months = vec![5, 6, 7];
        method.deployment_years = vec![2018];
        let facilities = vec![Facility::new("a", 50.0, -110.0)];
        let schedule = MethodSchedule::new(&method, &facilities);
        assert!(schedule.due_sites(date(4, 30)).is_empty());
        assert_eq!(schedule.due_sites(date(5, 1)).len(), 1);
        assert!(!schedule.is_deployable(NaiveDate::from_ymd_opt(2019, 5, 1).unwrap()));
    }

    #[test]
    fn test_close_year_reports_and_resets() {
        let method = MethodConfig::ogi("OGI").with_site_defaults(params(2, 0));
        let facilities = vec![Facility::new("a", 50.0, -110.0), Facility::new("b", 50.0, -110.0)];
        let mut schedule = MethodSchedule::new(&method, &facilities);
        schedule.site_mut(FacilityId(0)).record_survey(date(1, 1));
        schedule.site_mut(FacilityId(0)).record_survey(date(2, 1));
        schedule.site_mut(FacilityId(1)).record_survey(date(2, 1));
        let missed = schedule.close_year();
        assert_eq!(
            missed,
            vec![QuotaShortfall {
                facility: FacilityId(1),
                completed: 1,
                required: 2
            }]
        );
        assert_eq!(schedule.site(FacilityId(0)).surveys_this_year, 0);
    }

    #[test]
    fn test_waived_sites_never_miss_quota() {
        let method = MethodConfig::ogi("OGI").with_site_defaults(params(3, 0));
        let facilities = vec![Facility::new("a", 50.0, -110.0), Facility::new("b", 50.0, -110.0)];
        let mut schedule = MethodSchedule::new(&method, &facilities);
        schedule.waive_quota(FacilityId(0));
        schedule.site_mut(FacilityId(0)).record_survey(date(3, 1));
        let missed = schedule.close_year();
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].facility, FacilityId(1));
        assert_eq!(schedule.site(FacilityId(0)).surveys_this_year, 0);
    }
}
