//! Append-only event ledger and daily time series
//!
//! The ledger is the replicate's only output channel. Events are pushed in the
//! order they happen, so two runs with the same seed produce identical
//! sequences. Aggregation, costing summaries and persistence happen outside
//! the engine.
//!
//! Alongside the events, every method keeps a run of survey campaigns: fixed
//! windows of `floor(365 / surveys_per_year)` days with their own survey,
//! flag, tag and repair tallies.

use crate::config::method::MethodConfig;
use crate::core_types::ids::{CrewId, DetectionSource, FacilityId, LeakId, MethodId};
use crate::core_types::units::{GramsPerSecond, KilogramsPerDay};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// What a cost entry pays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    MethodUpfront,
    MethodDaily,
    MethodPerSite,
    Repair,
    Verification,
}

/// Ledger entry payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    LeakCreated {
        leak: LeakId,
        facility: FacilityId,
        rate: GramsPerSecond,
        /// Pre-existing at simulation start
        initial: bool,
    },
    Surveyed {
        method: MethodId,
        crew: CrewId,
        facility: FacilityId,
    },
    Flagged {
        method: MethodId,
        facility: FacilityId,
        leak: Option<LeakId>,
        measured: GramsPerSecond,
    },
    Tagged {
        leak: LeakId,
        facility: FacilityId,
        source: DetectionSource,
        initially_detected_by: Option<MethodId>,
    },
    Repaired {
        leak: LeakId,
        facility: FacilityId,
        tagged_on: NaiveDate,
    },
    Verified {
        leak: LeakId,
        facility: FacilityId,
    },
    CostIncurred {
        category: CostCategory,
        method: Option<MethodId>,
        amount: f64,
    },
    WeatherBlocked {
        method: MethodId,
        facility: FacilityId,
    },
    /// Due sites a method could not reach today
    CapacityShortfall {
        method: MethodId,
        unvisited: usize,
    },
    SurveyQuotaMissed {
        method: MethodId,
        facility: FacilityId,
        year: i32,
        completed: u32,
        required: u32,
    },
}

/// Dated ledger entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Outcomes that are counted rather than logged one by one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counters {
    /// Detections of a leak that was already in the repair pipeline
    pub redundant_leak_tags: u64,
    /// Site flags raised on a site already awaiting follow-up
    pub redundant_site_flags: u64,
    /// Site flags raised where tagged leaks were still emitting
    pub flags_on_tagged_sites: u64,
    /// Site flags that pass the threshold only because of vented emissions
    pub vent_driven_flags: u64,
    /// Leaks present at a surveyed site but not detected
    pub missed_leaks: u64,
    /// Above-threshold candidates dropped by the follow-up ratio
    pub rejected_by_ratio: u64,
    /// Operator detections of leaks already tagged
    pub redundant_operator_tags: u64,
    /// Site flags raised on the instant threshold, skipping the watchlist
    pub instant_flags: u64,
}

/// End-of-day state of the replicate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub active_leaks: usize,
    pub new_leaks: usize,
    pub leak_emissions: KilogramsPerDay,
    pub vent_emissions: KilogramsPerDay,
    /// Open repair tickets (reporting, awaiting repair or verification)
    pub pipeline_size: usize,
    pub repairs: usize,
    /// Site candidates released from watchlists today, kept or not
    pub released_flags: usize,
    /// Of those, the ones dropped by the follow-up ratio
    pub rejected_flags: usize,
    pub cost: f64,
}

/// Survey cycle of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub method: MethodId,
    pub index: u32,
    pub start: NaiveDate,
    pub surveys: u64,
    pub flags: u64,
    pub tags: u64,
    pub repairs: u64,
}

/// What a campaign tally counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignTally {
    Survey,
    Flag,
    Tag,
    Repair,
}

/// Campaign length of each method, in days.
///
/// Scheduled methods run `floor(365 / surveys_per_year)` day campaigns.
/// Follow-up methods share the scheduled length when every scheduled method
/// agrees on one, otherwise they run yearly campaigns.
pub fn campaign_days(methods: &[MethodConfig]) -> Vec<u32> {
    let scheduled = |m: &MethodConfig| match m.site_defaults.surveys_per_year {
        0 => 365,
        rs => (365 / rs).max(1),
    };
    let mut lengths = methods
        .iter()
        .filter(|m| !m.follow_up.is_follow_up)
        .map(scheduled);
    let shared = match lengths.next() {
        Some(first) if lengths.all(|l| l == first) => first,
        _ => 365,
    };
    methods
        .iter()
        .map(|m| if m.follow_up.is_follow_up { shared } else { scheduled(m) })
        .collect()
}

/// Campaign tallies of every method over the horizon
#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignBook {
    start: Option<NaiveDate>,
    lengths: Vec<u32>,
    campaigns: Vec<Vec<Campaign>>,
}

impl CampaignBook {
    /// Lay out every campaign between `start` and `end` for each method
    pub fn new(start: NaiveDate, end: NaiveDate, lengths: Vec<u32>) -> Self {
        let horizon = (end - start).num_days().max(0);
        let campaigns = lengths
            .iter()
            .enumerate()
            .map(|(m, &days)| {
                let days = i64::from(days.max(1));
                (0..=horizon / days)
                    .map(|i| Campaign {
                        method: MethodId(m as u16),
                        index: i as u32,
                        start: start + Duration::days(i * days),
                        surveys: 0,
                        flags: 0,
                        tags: 0,
                        repairs: 0,
                    })
                    .collect()
            })
            .collect();
        Self {
            start: Some(start),
            lengths,
            campaigns,
        }
    }

    /// Count one outcome against the campaign running on `date`
    pub fn record(&mut self, method: MethodId, date: NaiveDate, tally: CampaignTally) {
        let (Some(start), Some(&days)) = (self.start, self.lengths.get(method.index())) else {
            return;
        };
        let offset = (date - start).num_days();
        if offset < 0 {
            return;
        }
        let index = (offset / i64::from(days.max(1))) as usize;
        let Some(campaign) = self
            .campaigns
            .get_mut(method.index())
            .and_then(|c| c.get_mut(index))
        else {
            return;
        };
        match tally {
            CampaignTally::Survey => campaign.surveys += 1,
            CampaignTally::Flag => campaign.flags += 1,
            CampaignTally::Tag => campaign.tags += 1,
            CampaignTally::Repair => campaign.repairs += 1,
        }
    }

    pub fn for_method(&self, method: MethodId) -> &[Campaign] {
        self.campaigns.get(method.index()).map_or(&[], Vec::as_slice)
    }

    /// All campaigns, method by method
    pub fn into_campaigns(self) -> Vec<Campaign> {
        self.campaigns.into_iter().flatten().collect()
    }
}

/// Event sink of one replicate
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ledger {
    events: Vec<Event>,
    pub counters: Counters,
    pub campaigns: CampaignBook,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, date: NaiveDate, kind: EventKind) {
        self.events.push(Event { date, kind });
    }

    /// Record a cost; zero amounts are skipped
    pub fn cost(
        &mut self,
        date: NaiveDate,
        category: CostCategory,
        method: Option<MethodId>,
        amount: f64,
    ) {
        if amount != 0.0 {
            self.record(
                date,
                EventKind::CostIncurred {
                    category,
                    method,
                    amount,
                },
            );
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Split into events and campaigns
    pub fn into_parts(self) -> (Vec<Event>, Vec<Campaign>) {
        (self.events, self.campaigns.into_campaigns())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded from index `from` onward
    pub fn since(&self, from: usize) -> &[Event] {
        self.events.get(from..).unwrap_or_default()
    }
}
