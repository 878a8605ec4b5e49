//! Leak pool and per-site emission aggregates
//!
//! The pool owns every leak that is still emitting. Leaks are kept in a flat
//! id-keyed map for lookup, plus an insertion-ordered list per facility so that
//! every scan over a site visits leaks in the same order on every rerun.

use crate::core_types::ids::{DetectionSource, FacilityId, LeakId, MethodId};
use crate::core_types::units::GramsPerSecond;
use crate::emissions::leak::{Leak, LeakState};
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Aggregate emissions of one facility, kept in sync with its leak set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteEmissionState {
    /// Sum of all emitting leaks (active and tagged)
    pub leak_rate: GramsPerSecond,
    /// Design (vented) emissions, constant over the run
    pub vent_rate: GramsPerSecond,
    /// Leak rate per equipment group
    pub group_rates: Vec<GramsPerSecond>,
}

impl SiteEmissionState {
    fn new(groups: u32, vent_rate: GramsPerSecond) -> Self {
        Self {
            leak_rate: GramsPerSecond::ZERO,
            vent_rate,
            group_rates: vec![GramsPerSecond::ZERO; groups.max(1) as usize],
        }
    }

    /// Total rate seen by a site-scale sensor
    pub fn total_rate(&self) -> GramsPerSecond {
        self.leak_rate + self.vent_rate
    }

    /// Rate seen by an equipment-scale sensor on `group` (vent split evenly)
    pub fn group_rate(&self, group: usize) -> GramsPerSecond {
        let share = self.vent_rate / self.group_rates.len() as f64;
        self.group_rates.get(group).copied().unwrap_or_default() + share
    }
}

/// Result of trying to tag a leak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// Leak moved from active to tagged
    Tagged,
    /// Leak was already in the repair pipeline
    AlreadyTagged,
    /// No such leak (already repaired)
    Missing,
}

/// All emitting leaks of one replicate
#[derive(Debug, Clone)]
pub struct LeakPool {
    leaks: FxHashMap<LeakId, Leak>,
    by_site: Vec<Vec<LeakId>>,
    sites: Vec<SiteEmissionState>,
    next_id: u64,
}

impl LeakPool {
    /// Create an empty pool; `groups` and `vent_rates` are indexed by facility
    pub fn new(groups: &[u32], vent_rates: &[GramsPerSecond]) -> Self {
        let sites = groups
            .iter()
            .enumerate()
            .map(|(idx, g)| {
                SiteEmissionState::new(*g, vent_rates.get(idx).copied().unwrap_or_default())
            })
            .collect();
        Self {
            leaks: FxHashMap::default(),
            by_site: vec![Vec::new(); groups.len()],
            sites,
            next_id: 0,
        }
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Create a leak and update its site aggregate
    pub fn insert(
        &mut self,
        facility: FacilityId,
        equipment_group: u32,
        rate: GramsPerSecond,
        created: NaiveDate,
    ) -> LeakId {
        let id = LeakId(self.next_id);
        self.next_id += 1;
        self.by_site[facility.index()].push(id);
        self.leaks
            .insert(id, Leak::new(id, facility, equipment_group, rate, created));
        self.refresh_site(facility);
        id
    }

    pub fn get(&self, id: LeakId) -> Option<&Leak> {
        self.leaks.get(&id)
    }

    /// Mark a leak as owned by the repair pipeline
    pub fn tag(
        &mut self,
        id: LeakId,
        date: NaiveDate,
        source: DetectionSource,
        initially_detected_by: Option<MethodId>,
    ) -> TagOutcome {
        let Some(leak) = self.leaks.get_mut(&id) else {
            return TagOutcome::Missing;
        };
        if leak.is_tagged() {
            return TagOutcome::AlreadyTagged;
        }
        leak.state = LeakState::Tagged;
        leak.tagged_on = Some(date);
        leak.tagged_by = Some(source);
        leak.initially_detected_by = initially_detected_by;
        TagOutcome::Tagged
    }

    /// Remove a repaired leak; it stops emitting immediately
    pub fn remove(&mut self, id: LeakId) -> Option<Leak> {
        let leak = self.leaks.remove(&id)?;
        self.by_site[leak.facility.index()].retain(|l| *l != id);
        self.refresh_site(leak.facility);
        Some(leak)
    }

    /// Leaks at a facility in creation order
    pub fn leaks_at(&self, facility: FacilityId) -> impl Iterator<Item = &Leak> + '_ {
        self.by_site
            .get(facility.index())
            .into_iter()
            .flatten()
            .filter_map(|id| self.leaks.get(id))
    }

    /// Untagged leaks at a facility in creation order
    pub fn untagged_at(&self, facility: FacilityId) -> impl Iterator<Item = &Leak> + '_ {
        self.leaks_at(facility).filter(|l| !l.is_tagged())
    }

    /// Every leak, site by site, in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Leak> + '_ {
        self.by_site
            .iter()
            .flatten()
            .filter_map(|id| self.leaks.get(id))
    }

    pub fn site_state(&self, facility: FacilityId) -> Option<&SiteEmissionState> {
        self.sites.get(facility.index())
    }

    pub fn has_tagged_at(&self, facility: FacilityId) -> bool {
        self.leaks_at(facility).any(Leak::is_tagged)
    }

    /// Number of leaks still emitting
    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }

    pub fn untagged_count(&self) -> usize {
        self.leaks.values().filter(|l| !l.is_tagged()).count()
    }

    /// Total leak emissions across all sites
    pub fn total_leak_rate(&self) -> GramsPerSecond {
        self.sites.iter().map(|s| s.leak_rate).sum()
    }

    pub fn total_vent_rate(&self) -> GramsPerSecond {
        self.sites.iter().map(|s| s.vent_rate).sum()
    }

    fn refresh_site(&mut self, facility: FacilityId) {
        let idx = facility.index();
        let site = &mut self.sites[idx];
        for rate in &mut site.group_rates {
            *rate = GramsPerSecond::ZERO;
        }
        let groups = site.group_rates.len();
        let mut total = GramsPerSecond::ZERO;
        for id in &self.by_site[idx] {
            if let Some(leak) = self.leaks.get(id) {
                total += leak.rate;
                let group = (leak.equipment_group as usize).min(groups - 1);
                site.group_rates[group] += leak.rate;
            }
        }
        site.leak_rate = total;
    }
}
