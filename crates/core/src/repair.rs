//! Repair pipeline
//!
//! Each tagged leak owns one ticket that moves through
//! `Reporting(r) → AwaitingRepair(m) → Repaired [→ VerificationPending(k) → Verified]`.
//! Every day the active countdown drops by one and stages that reach zero
//! resolve immediately, so a ticket tagged on day `T` removes its leak on day
//! `T + r + m` exactly. Tickets submitted during a day join the pipeline only
//! after existing tickets have advanced.

use crate::config::program::{RepairConfig, VerificationConfig};
use crate::core_types::ids::{DetectionSource, FacilityId, LeakId, MethodId};
use crate::distribution::ScalarSource;
use crate::emissions::pool::LeakPool;
use crate::random::RandomSource;
use crate::simulation::ledger::{CampaignTally, CostCategory, EventKind, Ledger};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::trace;

/// Current countdown of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepairStage {
    Reporting(u32),
    AwaitingRepair(u32),
    VerificationPending(u32),
    /// Closed; dropped from the pipeline at the end of the day
    Closed,
}

/// A tagged leak on its way to repair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairTicket {
    pub leak: LeakId,
    pub facility: FacilityId,
    pub source: DetectionSource,
    pub tagged_on: NaiveDate,
    pub stage: RepairStage,
}

impl RepairTicket {
    pub fn new(
        leak: LeakId,
        facility: FacilityId,
        source: DetectionSource,
        tagged_on: NaiveDate,
        reporting_delay: u32,
    ) -> Self {
        Self {
            leak,
            facility,
            source,
            tagged_on,
            stage: RepairStage::Reporting(reporting_delay),
        }
    }

    fn tick(&mut self) {
        self.stage = match self.stage {
            RepairStage::Reporting(n) => RepairStage::Reporting(n.saturating_sub(1)),
            RepairStage::AwaitingRepair(n) => RepairStage::AwaitingRepair(n.saturating_sub(1)),
            RepairStage::VerificationPending(n) => {
                RepairStage::VerificationPending(n.saturating_sub(1))
            }
            RepairStage::Closed => RepairStage::Closed,
        };
    }
}

/// What happened to the pipeline on one day
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineDay {
    pub repairs: usize,
    pub verifications: usize,
    pub cost: f64,
}

/// All open repair tickets of a replicate
#[derive(Debug, Clone)]
pub struct RepairPipeline {
    tickets: Vec<RepairTicket>,
    incoming: Vec<RepairTicket>,
    repair_delay: u32,
    repair_cost: ScalarSource,
    verification: Option<VerificationConfig>,
}

impl RepairPipeline {
    pub fn new(config: &RepairConfig) -> Self {
        Self {
            tickets: Vec::new(),
            incoming: Vec::new(),
            repair_delay: config.repair_delay,
            repair_cost: config.repair_cost.clone(),
            verification: config.verification,
        }
    }

    /// Queue a newly tagged leak; it enters the pipeline at the end of the day
    pub fn submit(&mut self, ticket: RepairTicket) {
        self.incoming.push(ticket);
    }

    /// Open tickets, including those submitted today
    pub fn len(&self) -> usize {
        self.tickets.len() + self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tickets(&self) -> &[RepairTicket] {
        &self.tickets
    }

    /// Advance existing tickets by one day, then admit today's submissions
    pub fn process_day(
        &mut self,
        today: NaiveDate,
        pool: &mut LeakPool,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
    ) -> PipelineDay {
        let mut day = PipelineDay::default();
        let mut tickets = std::mem::take(&mut self.tickets);
        for ticket in &mut tickets {
            ticket.tick();
        }
        tickets.append(&mut self.incoming);
        for ticket in &mut tickets {
            self.settle(ticket, today, pool, rng, ledger, &mut day);
        }
        tickets.retain(|t| t.stage != RepairStage::Closed);
        self.tickets = tickets;
        day
    }

    /// Resolve every stage whose countdown is zero
    fn settle(
        &self,
        ticket: &mut RepairTicket,
        today: NaiveDate,
        pool: &mut LeakPool,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
        day: &mut PipelineDay,
    ) {
        loop {
            ticket.stage = match ticket.stage {
                RepairStage::Reporting(0) => RepairStage::AwaitingRepair(self.repair_delay),
                RepairStage::AwaitingRepair(0) => {
                    self.repair(ticket, today, pool, rng, ledger, day);
                    match self.verification {
                        Some(v) => RepairStage::VerificationPending(v.delay_days),
                        None => RepairStage::Closed,
                    }
                }
                RepairStage::VerificationPending(0) => {
                    let cost = self.verification.map_or(0.0, |v| v.cost);
                    ledger.record(
                        today,
                        EventKind::Verified {
                            leak: ticket.leak,
                            facility: ticket.facility,
                        },
                    );
                    ledger.cost(today, CostCategory::Verification, None, cost);
                    day.verifications += 1;
                    day.cost += cost;
                    RepairStage::Closed
                }
                _ => return,
            };
        }
    }

    fn repair(
        &self,
        ticket: &RepairTicket,
        today: NaiveDate,
        pool: &mut LeakPool,
        rng: &mut RandomSource,
        ledger: &mut Ledger,
        day: &mut PipelineDay,
    ) {
        if pool.remove(ticket.leak).is_none() {
            return;
        }
        let cost = self.repair_cost.sample(rng);
        trace!(leak = %ticket.leak, days = (today - ticket.tagged_on).num_days(), "leak repaired");
        ledger.record(
            today,
            EventKind::Repaired {
                leak: ticket.leak,
                facility: ticket.facility,
                tagged_on: ticket.tagged_on,
            },
        );
        let method = match ticket.source {
            DetectionSource::Method(m) => Some(m),
            _ => None::<MethodId>,
        };
        if let Some(m) = method {
            ledger.campaigns.record(m, today, CampaignTally::Repair);
        }
        ledger.cost(today, CostCategory::Repair, method, cost);
        day.repairs += 1;
        day.cost += cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::units::GramsPerSecond;
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 3, 1).unwrap()
    }

    fn run_until_removed(reporting: u32, repair: u32, verification: Option<VerificationConfig>) -> (i64, Ledger) {
        let config = RepairConfig {
            repair_delay: repair,
            repair_cost: ScalarSource::Fixed(200.0),
            verification,
        };
        let mut pipeline = RepairPipeline::new(&config);
        let mut pool = LeakPool::new(&[1], &[]);
        let mut rng = RandomSource::seeded(1);
        let mut ledger = Ledger::new();
        let leak = pool.insert(FacilityId(0), 0, GramsPerSecond::new(1.0), start());
        pool.tag(leak, start(), DetectionSource::Method(MethodId(0)), None);
        pipeline.submit(RepairTicket::new(
            leak,
            FacilityId(0),
            DetectionSource::Method(MethodId(0)),
            start(),
            reporting,
        ));
        for d in 0..100 {
            let today = start() + Duration::days(d);
            pipeline.process_day(today, &mut pool, &mut rng, &mut ledger);
            if pool.get(leak).is_none() {
                return (d, ledger);
            }
        }
        panic!("leak never repaired");
    }

    #[test]
    fn test_removal_after_reporting_plus_repair_delay() {
        assert_eq!(run_until_removed(0, 14, None).0, 14);
        assert_eq!(run_until_removed(2, 14, None).0, 16);
        assert_eq!(run_until_removed(3, 0, None).0, 3);
        assert_eq!(run_until_removed(0, 0, None).0, 0);
    }

    #[test]
    fn test_verification_cost_recorded_after_delay() {
        let verification = Some(VerificationConfig {
            delay_days: 0,
            cost: 25.0,
        });
        let (days, ledger) = run_until_removed(0, 5, verification);
        assert_eq!(days, 5);
        let costs: Vec<_> = ledger
            .events()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::CostIncurred { category, amount, .. } => Some((category, amount)),
                _ => None,
            })
            .collect();
        assert_eq!(
            costs,
            vec![(CostCategory::Repair, 200.0), (CostCategory::Verification, 25.0)]
        );
    }

    #[test]
    fn test_pipeline_drains_closed_tickets() {
        let config = RepairConfig {
            repair_delay: 1,
            repair_cost: ScalarSource::Fixed(10.0),
            verification: Some(VerificationConfig {
                delay_days: 2,
                cost: 5.0,
            }),
        };
        let mut pipeline = RepairPipeline::new(&config);
        let mut pool = LeakPool::new(&[1], &[]);
        let mut rng = RandomSource::seeded(1);
        let mut ledger = Ledger::new();
        let leak = pool.insert(FacilityId(0), 0, GramsPerSecond::new(1.0), start());
        pipeline.submit(RepairTicket::new(leak, FacilityId(0), DetectionSource::Operator, start(), 0));
        assert_eq!(pipeline.len(), 1);
        let mut verified_on = None;
        for d in 0..10 {
            let today = start() + Duration::days(d);
            let day = pipeline.process_day(today, &mut pool, &mut rng, &mut ledger);
            if day.verifications > 0 {
                verified_on = Some(d);
            }
        }
        assert_eq!(verified_on, Some(3));
        assert!(pipeline.is_empty());
    }
}
