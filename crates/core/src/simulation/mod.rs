//! Daily simulation loop of one LDAR replicate
//!
//! [`Simulation`] owns every piece of mutable state of a replicate: the leak
//! pool, method schedulers with their crews, the flag board, the repair
//! pipeline and the ledger. A day runs strictly in this order:
//!
//! 1. age leaks and route naturally repaired ones into the pipeline
//! 2. generate new leaks
//! 3. operator walk-around (on its weekday)
//! 4. every method surveys its eligible sites
//! 5. follow-up selection over the whole day's flags, tagging and site flags
//! 6. repair pipeline advances by one day
//! 7. daily snapshot
//!
//! Replicates share only immutable inputs, so [`batch::run_batch`] can run
//! many of them in parallel.

pub mod batch;
pub mod ledger;

pub use batch::run_batch;
pub use ledger::{
    campaign_days, Campaign, CampaignBook, CampaignTally, CostCategory, Counters, DailySnapshot,
    Event, EventKind, Ledger,
};

use crate::config::method::MeasurementScale;
use crate::config::program::ProgramConfig;
use crate::core_types::facility::{sample_facilities, Facility};
use crate::core_types::ids::{DetectionSource, FacilityId, LeakId, MethodId};
use crate::core_types::units::KilogramsPerDay;
use crate::emissions::generator::LeakGenerator;
use crate::emissions::pool::{LeakPool, TagOutcome};
use crate::error::{SimError, SimResult};
use crate::methods::followup::{FlagBoard, FlagTarget, FollowUpSelector, TriagePolicy};
use crate::methods::scheduler::{DayContext, MethodScheduler};
use crate::operator::{OperatorFindings, OperatorModule};
use crate::random::RandomSource;
use crate::repair::{RepairPipeline, RepairTicket};
use crate::weather::lookup::WeatherLookup;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable inputs shared by every replicate of a batch
#[derive(Clone)]
pub struct SimulationInputs {
    /// Facility list before site sampling
    pub facilities: Vec<Facility>,
    pub weather: Arc<dyn WeatherLookup>,
}

impl SimulationInputs {
    pub fn new(facilities: Vec<Facility>, weather: Arc<dyn WeatherLookup>) -> Self {
        Self {
            facilities,
            weather,
        }
    }
}

/// Everything a finished replicate hands to external aggregation
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    pub program: String,
    pub seed: u64,
    /// Facilities simulated after site sampling
    pub facilities: usize,
    pub events: Vec<Event>,
    pub counters: Counters,
    pub snapshots: Vec<DailySnapshot>,
    /// Survey campaigns of every method, method by method
    pub campaigns: Vec<Campaign>,
    /// Tickets still in the pipeline when the horizon ended
    pub open_tickets: usize,
}

/// One replicate in progress
pub struct Simulation {
    program: ProgramConfig,
    facilities: Vec<Facility>,
    weather: Arc<dyn WeatherLookup>,
    rng: RandomSource,
    pool: LeakPool,
    operator: Option<OperatorModule>,
    schedulers: Vec<MethodScheduler>,
    selector: FollowUpSelector,
    flags: FlagBoard,
    pipeline: RepairPipeline,
    ledger: Ledger,
    snapshots: Vec<DailySnapshot>,
}

impl Simulation {
    /// Validate the program, draw the facility set and seed initial leaks.
    ///
    /// Every fatal input problem (configuration, distribution coverage,
    /// weather coverage) is reported here, before the first day runs.
    pub fn build(program: &ProgramConfig, inputs: &SimulationInputs, seed: u64) -> SimResult<Self> {
        program.validate()?;
        let mut rng = RandomSource::seeded(seed);
        let facilities = sample_facilities(&inputs.facilities, program.site_samples, &mut rng);
        if facilities.is_empty() {
            return Err(SimError::config(
                format!("program '{}'", program.name),
                "facility list is empty",
            ));
        }

        let emissions = &program.emissions;
        emissions.leak_rates.check_coverage(&facilities, "leak rate")?;
        emissions.initial_leaks.check_coverage(&facilities)?;
        if let Some(venting) = &emissions.venting {
            venting.check_coverage(&facilities, "vent rate")?;
        }
        if program.consider_weather {
            inputs
                .weather
                .ensure_covers(program.start_date, program.end_date, facilities[0].location)?;
        }

        let generator = LeakGenerator::new(emissions);
        let vent_rates = generator.vent_rates(&facilities, &mut rng)?;
        let groups: Vec<u32> = facilities.iter().map(|f| f.equipment_groups).collect();
        let mut pool = LeakPool::new(&groups, &vent_rates);
        let initial = generator.seed_initial(&facilities, &mut pool, program.start_date, &mut rng)?;

        let mut ledger = Ledger::new();
        ledger.campaigns = CampaignBook::new(
            program.start_date,
            program.end_date,
            campaign_days(&program.methods),
        );
        for id in &initial {
            if let Some(leak) = pool.get(*id) {
                ledger.record(
                    program.start_date,
                    EventKind::LeakCreated {
                        leak: leak.id,
                        facility: leak.facility,
                        rate: leak.rate,
                        initial: true,
                    },
                );
            }
        }

        let operator = program
            .operator
            .map(|op| OperatorModule::new(op, emissions, initial.len(), facilities.len()));
        let schedulers: Vec<MethodScheduler> = program
            .methods
            .iter()
            .enumerate()
            .map(|(idx, method)| {
                MethodScheduler::new(
                    MethodId(idx as u16),
                    method.clone(),
                    emissions,
                    &facilities,
                    program.consider_weather,
                    &mut rng,
                )
            })
            .collect();
        let selector = FollowUpSelector::new(
            program
                .methods
                .iter()
                .map(|m| TriagePolicy::from(&m.follow_up))
                .collect(),
        );

        debug!(
            program = %program.name,
            seed,
            sites = facilities.len(),
            initial_leaks = initial.len(),
            "replicate built"
        );

        Ok(Self {
            flags: FlagBoard::new(facilities.len()),
            pipeline: RepairPipeline::new(&program.repair),
            program: program.clone(),
            facilities,
            weather: Arc::clone(&inputs.weather),
            rng,
            pool,
            operator,
            schedulers,
            selector,
            ledger,
            snapshots: Vec::new(),
        })
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn pool(&self) -> &LeakPool {
        &self.pool
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn flags(&self) -> &FlagBoard {
        &self.flags
    }

    pub fn schedulers(&self) -> &[MethodScheduler] {
        &self.schedulers
    }

    /// Run every day of the horizon and hand back the outputs
    pub fn run(mut self) -> SimResult<SimulationOutput> {
        let start = self.program.start_date;
        let end = self.program.end_date;
        info!(
            program = %self.program.name,
            seed = self.rng.seed(),
            sites = self.facilities.len(),
            methods = self.schedulers.len(),
            days = self.program.horizon_days(),
            "replicate started"
        );

        let mut today = start;
        while today <= end {
            if today != start && today.ordinal() == 1 {
                self.close_year(today.year() - 1, today - Duration::days(1));
            }
            self.step(today)?;
            let Some(next) = today.succ_opt() else {
                break;
            };
            today = next;
        }
        self.close_year(end.year(), end);

        let counters = self.ledger.counters;
        let (events, campaigns) = self.ledger.into_parts();
        let output = SimulationOutput {
            program: self.program.name.clone(),
            seed: self.rng.seed(),
            facilities: self.facilities.len(),
            counters,
            open_tickets: self.pipeline.len(),
            snapshots: self.snapshots,
            campaigns,
            events,
        };
        info!(
            program = %output.program,
            seed = output.seed,
            events = output.events.len(),
            open_tickets = output.open_tickets,
            "replicate finished"
        );
        Ok(output)
    }

    fn close_year(&mut self, year: i32, date: NaiveDate) {
        for scheduler in &mut self.schedulers {
            scheduler.close_year(year, date, &mut self.ledger);
        }
    }

    /// Advance the replicate by one day
    pub fn step(&mut self, today: NaiveDate) -> SimResult<()> {
        let mark = self.ledger.len();
        if today == self.program.start_date {
            for scheduler in &self.schedulers {
                scheduler.charge_upfront(today, &mut self.ledger);
            }
        }

        // 1. Natural repair of leaks that reached NRd
        let aged = LeakGenerator::new(&self.program.emissions).due_for_natural_repair(&self.pool, today);
        for leak in aged {
            self.tag_leak(leak, today, DetectionSource::Natural, None);
        }

        // 2. New leaks
        let created = LeakGenerator::new(&self.program.emissions).generate_new_leaks(
            &self.facilities,
            &mut self.pool,
            today,
            &mut self.rng,
        )?;
        for id in &created {
            if let Some(leak) = self.pool.get(*id) {
                self.ledger.record(
                    today,
                    EventKind::LeakCreated {
                        leak: leak.id,
                        facility: leak.facility,
                        rate: leak.rate,
                        initial: false,
                    },
                );
            }
        }

        // 3. Operator walk-around
        let findings = match &self.operator {
            Some(op) => op.run_weekly_check(today, &self.pool, &mut self.rng),
            None => OperatorFindings::default(),
        };
        self.ledger.counters.redundant_operator_tags += findings.redundant;
        for leak in findings.detected {
            self.tag_leak(leak, today, DetectionSource::Operator, None);
        }

        // 4. Method surveys
        let mut candidates = Vec::new();
        let mut followed_up: Vec<FacilityId> = Vec::new();
        {
            let ctx = DayContext {
                today,
                facilities: &self.facilities,
                pool: &self.pool,
                weather: self.weather.as_ref(),
                flags: &self.flags,
            };
            for scheduler in &mut self.schedulers {
                let day = scheduler.run_day(&ctx, &mut self.rng, &mut self.ledger)?;
                if scheduler.config().measurement_scale == MeasurementScale::Component {
                    followed_up.extend(day.completed);
                }
                candidates.extend(day.flags);
            }
        }

        // 5. Follow-up selection
        let selection = self.selector.select(candidates, today);
        self.ledger.counters.rejected_by_ratio += selection.rejected as u64;
        self.ledger.counters.instant_flags += selection.instant as u64;
        for flag in &selection.leaks {
            let FlagTarget::Leak(leak) = flag.target else {
                continue;
            };
            self.ledger.record(
                today,
                EventKind::Flagged {
                    method: flag.method,
                    facility: flag.facility,
                    leak: Some(leak),
                    measured: flag.measured,
                },
            );
            let initially = self.flags.get(flag.facility).map(|f| f.method);
            let source = DetectionSource::Method(flag.method);
            if self.tag_leak(leak, today, source, initially) == TagOutcome::AlreadyTagged {
                self.ledger.counters.redundant_leak_tags += 1;
            }
        }
        for facility in followed_up {
            self.flags.clear(facility);
        }

        let follow_up_enabled = self.program.has_follow_up_method();
        for flag in &selection.sites {
            self.ledger.record(
                today,
                EventKind::Flagged {
                    method: flag.method,
                    facility: flag.facility,
                    leak: None,
                    measured: flag.measured,
                },
            );
            if flag.vent_driven {
                self.ledger.counters.vent_driven_flags += 1;
            }
            if self.pool.has_tagged_at(flag.facility) {
                self.ledger.counters.flags_on_tagged_sites += 1;
            }
            if follow_up_enabled {
                let delay = self.reporting_delay(DetectionSource::Method(flag.method));
                if self.flags.raise(flag, delay) {
                    self.ledger
                        .campaigns
                        .record(flag.method, today, CampaignTally::Flag);
                } else {
                    self.ledger.counters.redundant_site_flags += 1;
                }
            } else {
                self.ledger
                    .campaigns
                    .record(flag.method, today, CampaignTally::Flag);
                let untagged: Vec<LeakId> =
                    self.pool.untagged_at(flag.facility).map(|l| l.id).collect();
                for leak in untagged {
                    self.tag_leak(leak, today, DetectionSource::Method(flag.method), Some(flag.method));
                }
            }
        }

        // 6. Repairs
        let repaired = self
            .pipeline
            .process_day(today, &mut self.pool, &mut self.rng, &mut self.ledger);

        // 7. Snapshot
        let cost: f64 = self
            .ledger
            .since(mark)
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::CostIncurred { amount, .. } => Some(amount),
                _ => None,
            })
            .sum();
        let snapshot = DailySnapshot {
            date: today,
            active_leaks: self.pool.len(),
            new_leaks: created.len(),
            leak_emissions: KilogramsPerDay::from(self.pool.total_leak_rate()),
            vent_emissions: KilogramsPerDay::from(self.pool.total_vent_rate()),
            pipeline_size: self.pipeline.len(),
            repairs: repaired.repairs,
            released_flags: selection.sites.len() - selection.instant + selection.rejected,
            rejected_flags: selection.rejected,
            cost,
        };
        debug!(
            date = %today,
            active = snapshot.active_leaks,
            new = snapshot.new_leaks,
            repaired = snapshot.repairs,
            pipeline = snapshot.pipeline_size,
            flagged_sites = self.flags.flagged_count(),
            "day complete"
        );
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Reporting delay of a tagging source; operator and natural repair skip it
    fn reporting_delay(&self, source: DetectionSource) -> u32 {
        match source {
            DetectionSource::Method(m) => self
                .schedulers
                .get(m.index())
                .map_or(0, |s| s.config().reporting_delay),
            DetectionSource::Operator | DetectionSource::Natural => 0,
        }
    }

    /// Tag a leak and open its repair ticket
    fn tag_leak(
        &mut self,
        leak: LeakId,
        today: NaiveDate,
        source: DetectionSource,
        initially_detected_by: Option<MethodId>,
    ) -> TagOutcome {
        let outcome = self.pool.tag(leak, today, source, initially_detected_by);
        if outcome != TagOutcome::Tagged {
            return outcome;
        }
        let Some(facility) = self.pool.get(leak).map(|l| l.facility) else {
            return TagOutcome::Missing;
        };
        self.ledger.record(
            today,
            EventKind::Tagged {
                leak,
                facility,
                source,
                initially_detected_by,
            },
        );
        if let DetectionSource::Method(method) = source {
            self.ledger.campaigns.record(method, today, CampaignTally::Tag);
        }
        let delay = self.reporting_delay(source);
        self.pipeline
            .submit(RepairTicket::new(leak, facility, source, today, delay));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::method::MethodConfig;
    use crate::core_types::facility::SiteMethodParams;
    use crate::distribution::InitialLeakCount;
    use crate::weather::lookup::{ConstantWeather, WeatherSample};

    fn inputs(n: u32) -> SimulationInputs {
        let facilities = (0..n)
            .map(|i| Facility::new(format!("site-{i}"), 51.0, -114.0 + f64::from(i) * 0.05))
            .collect();
        SimulationInputs::new(
            facilities,
            Arc::new(ConstantWeather(WeatherSample::new(10.0, 2.0, 0.0))),
        )
    }

    fn program() -> ProgramConfig {
        let mut program = ProgramConfig::new(
            "test",
            NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
        );
        program.methods.push(MethodConfig::ogi("OGI"));
        program
    }

    #[test]
    fn test_one_snapshot_per_day() {
        let output = Simulation::build(&program(), &inputs(4), 3)
            .and_then(Simulation::run)
            .unwrap();
        assert_eq!(output.snapshots.len(), 365);
        assert_eq!(output.facilities, 4);
        assert_eq!(output.seed, 3);
    }

    #[test]
    fn test_operator_tags_skip_reporting() {
        let mut program = program();
        program.methods.clear();
        program.emissions.lpr = 0.0;
        program.emissions.initial_leaks = InitialLeakCount::Empirical { counts: vec![5] };
        program.emissions.leak_rates = crate::distribution::RateDistribution::Empirical {
            samples: vec![20.0],
        };
        program.operator = Some(crate::config::program::OperatorConfig {
            weekday: chrono::Weekday::Mon,
            strength: 1.0,
            max_det_op: 1.0,
        });
        let output = Simulation::build(&program, &inputs(1), 9)
            .and_then(Simulation::run)
            .unwrap();
        let tagged: Vec<_> = output
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::Tagged {
                        source: DetectionSource::Operator,
                        ..
                    }
                )
            })
            .collect();
        assert!(!tagged.is_empty());
        assert!(tagged.iter().all(|e| e.date.weekday() == chrono::Weekday::Mon));
    }

    #[test]
    fn test_quota_misses_reported_at_year_end() {
        let mut program = program();
        program.methods[0] = MethodConfig::ogi("OGI").with_site_defaults(SiteMethodParams {
            surveys_per_year: 400,
            survey_minutes: 60.0,
            min_interval_days: 0,
        });
        let output = Simulation::build(&program, &inputs(2), 1)
            .and_then(Simulation::run)
            .unwrap();
        let missed = output
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::SurveyQuotaMissed { year: 2018, .. }))
            .count();
        assert_eq!(missed, 2);
    }

    #[test]
    fn test_campaign_tallies_match_events() {
        let mut program = program();
        program.emissions.lpr = 0.02;
        program.methods[0] = MethodConfig::ogi("OGI").with_site_defaults(SiteMethodParams {
            surveys_per_year: 4,
            survey_minutes: 60.0,
            min_interval_days: 80,
        });
        let output = Simulation::build(&program, &inputs(4), 12)
            .and_then(Simulation::run)
            .unwrap();
        assert_eq!(output.campaigns.len(), 5);
        let surveys = output
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Surveyed { .. }))
            .count() as u64;
        let tags = output
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::Tagged {
                        source: DetectionSource::Method(_),
                        ..
                    }
                )
            })
            .count() as u64;
        assert_eq!(output.campaigns.iter().map(|c| c.surveys).sum::<u64>(), surveys);
        assert_eq!(output.campaigns.iter().map(|c| c.tags).sum::<u64>(), tags);
        assert!(surveys > 0);
    }

    #[test]
    fn test_natural_repair_routes_old_leaks() {
        let mut program = program();
        program.methods.clear();
        program.emissions.lpr = 0.0;
        program.emissions.natural_repair = true;
        program.emissions.nrd_days = 30;
        program.emissions.initial_leaks = InitialLeakCount::Empirical { counts: vec![3] };
        program.repair.repair_delay = 0;
        let output = Simulation::build(&program, &inputs(1), 4)
            .and_then(Simulation::run)
            .unwrap();
        let last = output.snapshots.last().unwrap();
        assert_eq!(last.active_leaks, 0);
        assert!(output.events.iter().any(|e| matches!(
            e.kind,
            EventKind::Tagged {
                source: DetectionSource::Natural,
                ..
            }
        )));
    }
}
