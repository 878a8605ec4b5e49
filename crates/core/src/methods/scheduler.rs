//! Daily scheduling and dispatch of one LDAR method
//!
//! A [`MethodScheduler`] owns everything that persists between days for its
//! method: site schedules, crews and their carried-over tasks. Each day it
//! builds the list of eligible sites, applies the weather gate, spends crew
//! capacity according to the deployment type and hands every completed survey
//! to the [`DetectionEngine`].
//!
//! Deployment types form a closed set:
//! - `Mobile`: crews with a daylight-bounded workday, travelling by route
//!   planning or by sampled transit time, able to carry a survey over night
//! - `Stationary`: fixed sensors at facilities that have them, one survey per
//!   due site per day, no travel
//! - `Orbital`: every due, weather-passing site is observed, up to an optional
//!   daily cap

use crate::config::method::{DeploymentType, MeasurementScale, MethodConfig};
use crate::config::program::EmissionsConfig;
use crate::core_types::facility::{Facility, GeoPoint};
use crate::core_types::ids::{CrewId, FacilityId, MethodId};
use crate::emissions::pool::LeakPool;
use crate::error::SimResult;
use crate::methods::crew::{Crew, SurveyTask};
use crate::methods::followup::{CandidateFlag, FlagBoard, FlagTarget};
use crate::methods::route::RoutePlanner;
use crate::methods::schedule::{MethodSchedule, QuotaShortfall};
use crate::methods::sensor::DetectionEngine;
use crate::random::RandomSource;
use crate::simulation::ledger::{CampaignTally, CostCategory, EventKind, Ledger};
use crate::weather::daylight::available_work_hours;
use crate::weather::gate::WeatherGate;
use crate::weather::lookup::WeatherLookup;
use chrono::NaiveDate;
use tracing::{debug, trace};

/// Read-only view of the replicate for one day
pub struct DayContext<'a> {
    pub today: NaiveDate,
    pub facilities: &'a [Facility],
    pub pool: &'a LeakPool,
    pub weather: &'a dyn WeatherLookup,
    pub flags: &'a FlagBoard,
}

/// Output of one method for one day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodDay {
    pub flags: Vec<CandidateFlag>,
    /// Sites whose survey completed today
    pub completed: Vec<FacilityId>,
}

/// Deployment-specific capacity
#[derive(Debug, Clone, Copy)]
enum Deployment {
    Mobile,
    Stationary {
        sensors: u32,
    },
    Orbital {
        satellites: u32,
        cap: Option<usize>,
    },
}

/// Scheduler and dispatcher of one method
#[derive(Debug, Clone)]
pub struct MethodScheduler {
    id: MethodId,
    config: MethodConfig,
    engine: DetectionEngine,
    gate: WeatherGate,
    schedule: MethodSchedule,
    deployment: Deployment,
    /// Empty unless mobile
    crews: Vec<Crew>,
    planner: RoutePlanner,
}

impl MethodScheduler {
    /// Build the scheduler. Proportion thresholds are resolved here, once.
    pub fn new(
        id: MethodId,
        config: MethodConfig,
        emissions: &EmissionsConfig,
        facilities: &[Facility],
        consider_weather: bool,
        rng: &mut RandomSource,
    ) -> Self {
        let threshold = DetectionEngine::resolve_threshold(config.follow_up.threshold, emissions, rng);
        let engine = DetectionEngine::new(config.sensor, threshold);
        let gate = WeatherGate::new(config.weather_limits, consider_weather);
        let mut schedule = MethodSchedule::new(&config, facilities);
        let planner = RoutePlanner::new(config.travel.clone());
        let mut crews = Vec::new();
        let deployment = match config.deployment {
            DeploymentType::Mobile => {
                let fallback = facilities
                    .first()
                    .map_or(GeoPoint::new(0.0, 0.0), |f| f.location);
                let start = planner.initial_location(fallback);
                crews = (0..config.n_crews)
                    .map(|c| Crew::new(CrewId(c), start))
                    .collect();
                Deployment::Mobile
            }
            DeploymentType::Stationary => Deployment::Stationary {
                sensors: facilities.iter().map(|f| f.fixed_sensors).sum(),
            },
            DeploymentType::Orbital => Deployment::Orbital {
                satellites: config.n_crews,
                cap: config.daily_site_cap,
            },
        };
        // Follow-up methods only go where screening sends them; stationary
        // methods only watch sites with sensors installed
        for (idx, facility) in facilities.iter().enumerate() {
            let unassignable = config.follow_up.is_follow_up
                || (config.deployment == DeploymentType::Stationary && facility.fixed_sensors == 0);
            if unassignable {
                schedule.waive_quota(FacilityId(idx as u32));
            }
        }
        debug!(
            method = %config.label,
            threshold = %threshold,
            "method scheduler ready"
        );
        Self {
            id,
            config,
            engine,
            gate,
            schedule,
            deployment,
            crews,
            planner,
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &MethodConfig {
        &self.config
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn schedule(&self) -> &MethodSchedule {
        &self.schedule
    }

    pub fn is_follow_up(&self) -> bool {
        self.config.follow_up.is_follow_up
    }

    pub fn is_screening(&self) -> bool {
        self.config.is_screening()
    }

    /// Carried-over tasks of mobile crews
    pub fn open_tasks(&self) -> Vec<SurveyTask> {
        self.crews.iter().filter_map(|c| c.task).collect()
    }

    /// Units that carry the upfront cost
    fn unit_count(&self) -> u32 {
        match self.deployment {
            Deployment::Mobile => self.crews.len() as u32,
            Deployment::Stationary { sensors } => sensors,
            Deployment::Orbital { satellites, .. } => satellites,
        }
    }

    /// Charge upfront costs on the first simulated day
    pub fn charge_upfront(&self, today: NaiveDate, ledger: &mut Ledger) {
        let amount = self.config.cost.upfront * f64::from(self.unit_count());
        ledger.cost(today, CostCategory::MethodUpfront, Some(self.id), amount);
    }

    /// Site passes every eligibility rule that does not depend on crews
    pub fn is_eligible(&self, facility: FacilityId, ctx: &DayContext<'_>) -> bool {
        let site = self.schedule.site(facility);
        if site.in_progress_by.is_some() || !site.is_due(ctx.today) {
            return false;
        }
        if !self.schedule.is_deployable(ctx.today) {
            return false;
        }
        if self.is_follow_up() && !ctx.flags.is_ready(facility, ctx.today) {
            return false;
        }
        if let Deployment::Stationary { .. } = self.deployment {
            return ctx.facilities[facility.index()].fixed_sensors > 0;
        }
        true
    }

    /// Eligible sites in visiting priority order
    fn eligible_sites(&self, ctx: &DayContext<'_>) -> Vec<FacilityId> {
        let mut sites: Vec<FacilityId> = self
            .schedule
            .due_sites(ctx.today)
            .into_iter()
            .filter(|f| self.is_eligible(*f, ctx))
            .collect();
        if self.is_follow_up() {
            // Largest flagged measurement first
            sites.sort_by(|a, b| {
                let rate = |f: &FacilityId| ctx.flags.get(*f).map(|flag| flag.measured);
                rate(b).cmp(&rate(a))
            });
        }
        sites
    }

    /// Split candidates into workable sites, recording weather blocks
    fn apply_weather(
        &self,
        candidates: Vec<FacilityId>,
        ctx: &DayContext<'_>,
        ledger: &mut Ledger,
    ) -> SimResult<Vec<FacilityId>> {
        let mut workable = Vec::with_capacity(candidates.len());
        for facility in candidates {
            if self.site_workable(facility, ctx, ledger)? {
                workable.push(facility);
            }
        }
        Ok(workable)
    }

    fn site_workable(
        &self,
        facility: FacilityId,
        ctx: &DayContext<'_>,
        ledger: &mut Ledger,
    ) -> SimResult<bool> {
        let location = ctx.facilities[facility.index()].location;
        let outcome = self
            .gate
            .check(ctx.weather, location, ctx.today)
            .map_err(|e| e.for_method(&self.config.label))?;
        if !outcome.is_go() {
            ledger.record(
                ctx.today,
                EventKind::WeatherBlocked {
                    method: self.id,
                    facility,
                },
            );
        }
        Ok(outcome.is_go())
    }

    /// Run one day of this method
    pub fn run_day(
        &mut self,
        ctx: &DayContext<'_>,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
    ) -> SimResult<MethodDay> {
        let mut day = MethodDay::default();
        if !self.schedule.is_deployable(ctx.today) {
            return Ok(day);
        }
        let candidates = self.eligible_sites(ctx);
        let has_open_tasks = !self.open_tasks().is_empty();
        if candidates.is_empty() && !has_open_tasks {
            if let Deployment::Stationary { sensors } = self.deployment {
                self.charge_daily(ctx.today, sensors, ledger);
            }
            return Ok(day);
        }
        let workable = self.apply_weather(candidates, ctx, ledger)?;

        match self.deployment {
            Deployment::Mobile => {
                let mut crews = std::mem::take(&mut self.crews);
                let result = self.run_mobile(&mut crews, workable, ctx, rng, ledger, &mut day);
                self.crews = crews;
                result?;
            }
            Deployment::Stationary { sensors } => {
                self.charge_daily(ctx.today, sensors, ledger);
                for facility in workable {
                    self.complete_survey(facility, CrewId(0), ctx, rng, ledger, &mut day);
                }
            }
            Deployment::Orbital { satellites, cap } => {
                self.charge_daily(ctx.today, satellites, ledger);
                let limit = cap.unwrap_or(usize::MAX);
                let unvisited = workable.len().saturating_sub(limit);
                for facility in workable.into_iter().take(limit) {
                    self.complete_survey(facility, CrewId(0), ctx, rng, ledger, &mut day);
                }
                self.record_shortfall(ctx.today, unvisited, ledger);
            }
        }
        debug!(
            date = %ctx.today,
            method = %self.config.label,
            surveyed = day.completed.len(),
            flags = day.flags.len(),
            "method day complete"
        );
        Ok(day)
    }

    fn charge_daily(&self, today: NaiveDate, units: u32, ledger: &mut Ledger) {
        let amount = self.config.cost.per_day * f64::from(units);
        ledger.cost(today, CostCategory::MethodDaily, Some(self.id), amount);
    }

    fn record_shortfall(&self, today: NaiveDate, unvisited: usize, ledger: &mut Ledger) {
        if unvisited > 0 {
            ledger.record(
                today,
                EventKind::CapacityShortfall {
                    method: self.id,
                    unvisited,
                },
            );
        }
    }

    fn run_mobile(
        &mut self,
        crews: &mut [Crew],
        mut remaining: Vec<FacilityId>,
        ctx: &DayContext<'_>,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
        day: &mut MethodDay,
    ) -> SimResult<()> {
        for crew in crews.iter_mut() {
            let hours = available_work_hours(
                self.config.consider_daylight,
                self.config.max_workday_hours,
                crew.location.lat,
                ctx.today,
            );
            if hours <= 0.0 || hours < self.config.min_workday_hours {
                trace!(method = %self.config.label, crew = crew.id.0, hours, "workday too short");
                continue;
            }
            let mut minutes = hours * 60.0;
            let mut worked = false;

            if let Some(mut task) = crew.task.take() {
                if !self.site_workable(task.facility, ctx, ledger)? {
                    crew.task = Some(task);
                    continue;
                }
                worked = true;
                minutes -= task.work(minutes);
                crew.location = ctx.facilities[task.facility.index()].location;
                if task.is_complete() {
                    self.complete_survey(task.facility, crew.id, ctx, rng, ledger, day);
                } else {
                    crew.task = Some(task);
                    minutes = 0.0;
                }
            }

            while minutes > 0.0 {
                let options: Vec<&Facility> = remaining
                    .iter()
                    .map(|f| &ctx.facilities[f.index()])
                    .collect();
                let Some(leg) = self.planner.next_leg(crew.location, &options, rng) else {
                    break;
                };
                if leg.travel_minutes >= minutes {
                    break;
                }
                let facility = remaining.remove(leg.candidate);
                minutes -= leg.travel_minutes;
                worked = true;
                crew.location = ctx.facilities[facility.index()].location;

                let survey_minutes = self.schedule.site(facility).params.survey_minutes;
                if survey_minutes <= minutes {
                    minutes -= survey_minutes;
                    self.complete_survey(facility, crew.id, ctx, rng, ledger, day);
                } else {
                    let mut task = SurveyTask {
                        method: self.id,
                        crew: crew.id,
                        facility,
                        started: ctx.today,
                        remaining_minutes: survey_minutes,
                    };
                    task.work(minutes);
                    minutes = 0.0;
                    self.schedule.site_mut(facility).in_progress_by = Some(crew.id);
                    crew.task = Some(task);
                }
            }

            if worked {
                self.charge_daily(ctx.today, 1, ledger);
            }
            crew.location = self.planner.end_of_day(crew.location);
        }
        self.record_shortfall(ctx.today, remaining.len(), ledger);
        Ok(())
    }

    /// Book a finished survey and run detection on the site
    fn complete_survey(
        &mut self,
        facility: FacilityId,
        crew: CrewId,
        ctx: &DayContext<'_>,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
        day: &mut MethodDay,
    ) {
        self.schedule.site_mut(facility).record_survey(ctx.today);
        ledger.record(
            ctx.today,
            EventKind::Surveyed {
                method: self.id,
                crew,
                facility,
            },
        );
        ledger.cost(
            ctx.today,
            CostCategory::MethodPerSite,
            Some(self.id),
            self.config.cost.per_site,
        );
        ledger.campaigns.record(self.id, ctx.today, CampaignTally::Survey);

        let site = &ctx.facilities[facility.index()];
        let outcome = self
            .engine
            .survey(self.config.measurement_scale, site, ctx.pool, rng);
        ledger.counters.missed_leaks += u64::from(outcome.missed_leaks);
        trace!(
            method = %self.config.label,
            facility = %facility,
            leaks_flagged = outcome.leak_flags.len(),
            site_flag = outcome.site_flag.is_some(),
            "survey complete"
        );

        let flag = |target, measured, vent_driven| CandidateFlag {
            facility,
            target,
            measured,
            method: self.id,
            crew,
            date: ctx.today,
            vent_driven,
        };
        match self.config.measurement_scale {
            MeasurementScale::Component => {
                for (leak, measured) in outcome.leak_flags {
                    day.flags.push(flag(FlagTarget::Leak(leak), measured, false));
                }
            }
            MeasurementScale::Equipment | MeasurementScale::Site => {
                if let Some(site_flag) = outcome.site_flag {
                    day.flags
                        .push(flag(FlagTarget::Site, site_flag.measured, site_flag.vent_driven));
                }
            }
        }
        day.completed.push(facility);
    }

    /// Close the survey year and report quota shortfalls
    pub fn close_year(&mut self, year: i32, date: NaiveDate, ledger: &mut Ledger) -> usize {
        let missed: Vec<QuotaShortfall> = self.schedule.close_year();
        for m in &missed {
            ledger.record(
                date,
                EventKind::SurveyQuotaMissed {
                    method: self.id,
                    facility: m.facility,
                    year,
                    completed: m.completed,
                    required: m.required,
                },
            );
        }
        if !missed.is_empty() {
            debug!(method = %self.config.label, year, sites = missed.len(), "survey quota missed");
        }
        missed.len()
    }
}
