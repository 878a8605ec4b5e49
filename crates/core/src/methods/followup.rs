//! Candidate flags, the site flag board and follow-up selection
//!
//! Screening methods (equipment or site scale) raise site flags. Every day the
//! selector groups those flags by originating method and keeps the largest
//! measurement per site. Candidates then wait on the method's watchlist until
//! `delay_days` have passed since the oldest entry; repeated measurements of a
//! watched site are combined by the method's redundancy filter. On release the
//! watchlist is ranked by measured rate and `floor(ratio · n)` sites are kept.
//! With no delay this is a same-day ranking. Sites measured at or above the
//! instant threshold skip the watchlist and the ratio cut.
//!
//! Leak flags from component-scale methods skip the ranking. The follow-up
//! threshold has already been applied when the flag was raised, so ranking
//! only ever sees above-threshold candidates.

use crate::config::method::{FollowUpConfig, RedundancyFilter};
use crate::core_types::ids::{CrewId, FacilityId, LeakId, MethodId};
use crate::core_types::units::GramsPerSecond;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Guards `ratio · n` against representation error just below an integer
const RATIO_EPSILON: f64 = 1e-9;

/// What a candidate flag points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Leak(LeakId),
    Site,
}

/// One above-threshold detection raised during the day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateFlag {
    pub facility: FacilityId,
    pub target: FlagTarget,
    pub measured: GramsPerSecond,
    pub method: MethodId,
    pub crew: CrewId,
    pub date: NaiveDate,
    pub vent_driven: bool,
}

/// Outstanding request for a follow-up survey
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteFlag {
    pub method: MethodId,
    pub flagged_on: NaiveDate,
    /// First day a follow-up crew may act on the flag
    pub ready_on: NaiveDate,
    pub measured: GramsPerSecond,
}

/// Per-facility follow-up flags
#[derive(Debug, Clone, Default)]
pub struct FlagBoard {
    flags: Vec<Option<SiteFlag>>,
}

impl FlagBoard {
    pub fn new(sites: usize) -> Self {
        Self {
            flags: vec![None; sites],
        }
    }

    pub fn get(&self, facility: FacilityId) -> Option<&SiteFlag> {
        self.flags.get(facility.index()).and_then(Option::as_ref)
    }

    pub fn is_flagged(&self, facility: FacilityId) -> bool {
        self.get(facility).is_some()
    }

    /// Flag is set and its reporting delay has elapsed
    pub fn is_ready(&self, facility: FacilityId, today: NaiveDate) -> bool {
        self.get(facility).is_some_and(|f| f.ready_on <= today)
    }

    /// Place a flag. Returns `false` when the site was already flagged.
    pub fn raise(
        &mut self,
        flag: &CandidateFlag,
        reporting_delay: u32,
    ) -> bool {
        let Some(slot) = self.flags.get_mut(flag.facility.index()) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(SiteFlag {
            method: flag.method,
            flagged_on: flag.date,
            ready_on: flag.date + Duration::days(i64::from(reporting_delay)),
            measured: flag.measured,
        });
        true
    }

    /// Clear a flag after a follow-up survey
    pub fn clear(&mut self, facility: FacilityId) -> Option<SiteFlag> {
        self.flags.get_mut(facility.index()).and_then(Option::take)
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.iter().filter(|f| f.is_some()).count()
    }
}

/// Result of one day's triage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Leak flags, in arrival order
    pub leaks: Vec<CandidateFlag>,
    /// Retained site flags: instant ones first, then watchlist releases in method order
    pub sites: Vec<CandidateFlag>,
    /// Site flags that bypassed the watchlist on the instant threshold
    pub instant: usize,
    /// Above-threshold site candidates dropped by the ratio cut
    pub rejected: usize,
}

/// Triage settings of one method
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriagePolicy {
    pub ratio: f64,
    pub delay_days: u32,
    pub redundancy_filter: RedundancyFilter,
    pub instant_threshold: Option<GramsPerSecond>,
}

impl TriagePolicy {
    /// Same-day ranking at `ratio`
    pub fn ratio(ratio: f64) -> Self {
        Self {
            ratio,
            delay_days: 0,
            redundancy_filter: RedundancyFilter::Recent,
            instant_threshold: None,
        }
    }
}

impl From<&FollowUpConfig> for TriagePolicy {
    fn from(config: &FollowUpConfig) -> Self {
        Self {
            ratio: config.ratio,
            delay_days: config.delay_days,
            redundancy_filter: config.redundancy_filter,
            instant_threshold: config.instant_threshold.map(GramsPerSecond::new),
        }
    }
}

/// A site waiting on a watchlist
#[derive(Debug, Clone)]
struct WatchEntry {
    /// Latest candidate, carrying the aggregated measurement
    flag: CandidateFlag,
    measurements: Vec<f64>,
}

/// Candidates of one method awaiting release
#[derive(Debug, Clone, Default)]
struct Watchlist {
    opened_on: Option<NaiveDate>,
    sites: BTreeMap<FacilityId, WatchEntry>,
}

impl Watchlist {
    fn add(&mut self, flag: CandidateFlag, filter: RedundancyFilter, today: NaiveDate) {
        self.opened_on.get_or_insert(today);
        let entry = self.sites.entry(flag.facility).or_insert_with(|| WatchEntry {
            flag,
            measurements: Vec::new(),
        });
        entry.measurements.push(*flag.measured);
        entry.flag = CandidateFlag {
            measured: GramsPerSecond::new(filter.aggregate(&entry.measurements)),
            ..flag
        };
    }

    fn is_due(&self, delay_days: u32, today: NaiveDate) -> bool {
        self.opened_on
            .is_some_and(|opened| today >= opened + Duration::days(i64::from(delay_days)))
    }

    /// Empty the list, largest measurement first, ties by facility
    fn drain_ranked(&mut self) -> Vec<CandidateFlag> {
        self.opened_on = None;
        let mut ranked: Vec<CandidateFlag> = std::mem::take(&mut self.sites)
            .into_values()
            .map(|e| e.flag)
            .collect();
        ranked.sort_by(|a, b| {
            b.measured
                .cmp(&a.measured)
                .then(a.facility.cmp(&b.facility))
        });
        ranked
    }
}

/// Ratio-based triage across all methods, with per-method watchlists
#[derive(Debug, Clone)]
pub struct FollowUpSelector {
    /// Indexed by method
    policies: Vec<TriagePolicy>,
    watchlists: Vec<Watchlist>,
}

impl FollowUpSelector {
    pub fn new(policies: Vec<TriagePolicy>) -> Self {
        let watchlists = vec![Watchlist::default(); policies.len()];
        Self {
            policies,
            watchlists,
        }
    }

    /// Number of candidates retained from `n` at `ratio`
    pub fn retained(ratio: f64, n: usize) -> usize {
        let kept = (ratio.clamp(0.0, 1.0) * n as f64 + RATIO_EPSILON).floor() as usize;
        kept.min(n)
    }

    /// Sites currently waiting on `method`'s watchlist
    pub fn watched(&self, method: MethodId) -> usize {
        self.watchlists.get(method.index()).map_or(0, |w| w.sites.len())
    }

    fn policy(&self, method: MethodId) -> TriagePolicy {
        self.policies
            .get(method.index())
            .copied()
            .unwrap_or_else(|| TriagePolicy::ratio(1.0))
    }

    /// Resolve the day's flags and release watchlists whose delay has passed
    pub fn select(&mut self, flags: Vec<CandidateFlag>, today: NaiveDate) -> Selection {
        let mut selection = Selection::default();
        let mut by_method: BTreeMap<MethodId, BTreeMap<FacilityId, CandidateFlag>> =
            BTreeMap::new();

        for flag in flags {
            match flag.target {
                FlagTarget::Leak(_) => selection.leaks.push(flag),
                FlagTarget::Site => {
                    let sites = by_method.entry(flag.method).or_default();
                    sites
                        .entry(flag.facility)
                        .and_modify(|best| {
                            if flag.measured > best.measured {
                                *best = flag;
                            }
                        })
                        .or_insert(flag);
                }
            }
        }

        for (method, sites) in by_method {
            let policy = self.policy(method);
            if self.watchlists.len() <= method.index() {
                self.watchlists.resize(method.index() + 1, Watchlist::default());
            }
            let watchlist = &mut self.watchlists[method.index()];
            for flag in sites.into_values() {
                if policy.instant_threshold.is_some_and(|t| flag.measured >= t) {
                    watchlist.sites.remove(&flag.facility);
                    selection.instant += 1;
                    selection.sites.push(flag);
                } else {
                    watchlist.add(flag, policy.redundancy_filter, today);
                }
            }
            if watchlist.sites.is_empty() {
                watchlist.opened_on = None;
            }
        }

        for (idx, watchlist) in self.watchlists.iter_mut().enumerate() {
            let policy = self
                .policies
                .get(idx)
                .copied()
                .unwrap_or_else(|| TriagePolicy::ratio(1.0));
            if !watchlist.is_due(policy.delay_days, today) {
                continue;
            }
            let mut ranked = watchlist.drain_ranked();
            let keep = Self::retained(policy.ratio, ranked.len());
            selection.rejected += ranked.len() - keep;
            ranked.truncate(keep);
            selection
                .sites
                .extend(ranked.into_iter().map(|flag| CandidateFlag { date: today, ..flag }));
        }
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 5, 1).unwrap()
    }

    fn site_flag(method: u16, facility: u32, measured: f64) -> CandidateFlag {
        CandidateFlag {
            facility: FacilityId(facility),
            target: FlagTarget::Site,
            measured: GramsPerSecond::new(measured),
            method: MethodId(method),
            crew: CrewId(0),
            date: date(),
            vent_driven: false,
        }
    }

    #[test]
    fn test_ratio_floor() {
        assert_eq!(FollowUpSelector::retained(1.0, 7), 7);
        assert_eq!(FollowUpSelector::retained(0.0, 7), 0);
        assert_eq!(FollowUpSelector::retained(0.5, 7), 3);
        assert_eq!(FollowUpSelector::retained(0.29, 100), 29);
        assert_eq!(FollowUpSelector::retained(0.1, 3), 0);
    }

    #[test]
    fn test_top_fraction_kept_per_method() {
        let mut selector = FollowUpSelector::new(vec![TriagePolicy::ratio(0.5), TriagePolicy::ratio(1.0)]);
        let flags = vec![
            site_flag(0, 1, 0.1),
            site_flag(0, 2, 0.9),
            site_flag(0, 3, 0.5),
            site_flag(0, 4, 0.3),
            site_flag(1, 5, 0.01),
        ];
        let selection = selector.select(flags, date());
        let kept: Vec<_> = selection.sites.iter().map(|f| (f.method.0, f.facility.0)).collect();
        assert_eq!(kept, vec![(0, 2), (0, 3), (1, 5)]);
        assert_eq!(selection.rejected, 2);
    }

    #[test]
    fn test_duplicate_sites_keep_max_measurement() {
        let mut selector = FollowUpSelector::new(vec![TriagePolicy::ratio(1.0)]);
        let selection = selector.select(vec![site_flag(0, 1, 0.2), site_flag(0, 1, 0.7)], date());
        assert_eq!(selection.sites.len(), 1);
        assert_eq!(*selection.sites[0].measured, 0.7);
    }

    #[test]
    fn test_leak_flags_bypass_ranking() {
        let mut selector = FollowUpSelector::new(vec![TriagePolicy::ratio(0.0)]);
        let mut leak = site_flag(0, 1, 0.001);
        leak.target = FlagTarget::Leak(LeakId(4));
        let selection = selector.select(vec![leak, site_flag(0, 2, 5.0)], date());
        assert_eq!(selection.leaks, vec![leak]);
        assert!(selection.sites.is_empty());
    }

    #[test]
    fn test_flag_board_readiness() {
        let mut board = FlagBoard::new(3);
        let flag = site_flag(0, 1, 1.0);
        assert!(board.raise(&flag, 2));
        assert!(!board.raise(&flag, 2));
        assert!(!board.is_ready(FacilityId(1), date() + Duration::days(1)));
        assert!(board.is_ready(FacilityId(1), date() + Duration::days(2)));
        assert_eq!(board.flagged_count(), 1);
        assert!(board.clear(FacilityId(1)).is_some());
        assert!(!board.is_flagged(FacilityId(1)));
    }

    fn delayed(days: u32, filter: RedundancyFilter, ratio: f64) -> TriagePolicy {
        TriagePolicy {
            ratio,
            delay_days: days,
            redundancy_filter: filter,
            instant_threshold: None,
        }
    }

    fn on(day: i64, mut flag: CandidateFlag) -> CandidateFlag {
        flag.date = date() + Duration::days(day);
        flag
    }

    #[test]
    fn test_no_delay_releases_same_day() {
        let mut selector = FollowUpSelector::new(vec![delayed(0, RedundancyFilter::Recent, 1.0)]);
        let selection = selector.select(vec![site_flag(0, 1, 0.4)], date());
        assert_eq!(selection.sites.len(), 1);
        assert_eq!(selector.watched(MethodId(0)), 0);
    }

    #[test]
    fn test_delay_holds_candidates_until_grace_period_ends() {
        let mut selector = FollowUpSelector::new(vec![delayed(3, RedundancyFilter::Max, 0.5)]);
        let d = |n: i64| date() + Duration::days(n);

        let first = selector.select(vec![site_flag(0, 1, 0.4), site_flag(0, 2, 0.1)], d(0));
        assert!(first.sites.is_empty());
        assert_eq!(first.rejected, 0);
        assert_eq!(selector.watched(MethodId(0)), 2);

        let second = selector.select(vec![on(1, site_flag(0, 2, 0.9)), on(1, site_flag(0, 3, 0.2))], d(1));
        assert!(second.sites.is_empty());
        assert!(selector.select(Vec::new(), d(2)).sites.is_empty());

        // Three watched sites at floor(0.5 * 3) = 1; site 2 ranks first on its max of 0.9
        let released = selector.select(Vec::new(), d(3));
        assert_eq!(released.sites.len(), 1);
        assert_eq!(released.sites[0].facility, FacilityId(2));
        assert_eq!(*released.sites[0].measured, 0.9);
        assert_eq!(released.sites[0].date, d(3));
        assert_eq!(released.rejected, 2);
        assert_eq!(selector.watched(MethodId(0)), 0);
    }

    #[test]
    fn test_recent_and_mean_filters_on_watchlist() {
        let d = |n: i64| date() + Duration::days(n);
        for (filter, expected) in [(RedundancyFilter::Recent, 0.2), (RedundancyFilter::Mean, 0.5)] {
            let mut selector = FollowUpSelector::new(vec![delayed(1, filter, 1.0)]);
            selector.select(vec![site_flag(0, 1, 0.8)], d(0));
            let released = selector.select(vec![on(1, site_flag(0, 1, 0.2))], d(1));
            assert_eq!(released.sites.len(), 1);
            assert!((*released.sites[0].measured - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_instant_threshold_bypasses_delay_and_ratio() {
        let mut policy = delayed(30, RedundancyFilter::Recent, 0.0);
        policy.instant_threshold = Some(GramsPerSecond::new(1.0));
        let mut selector = FollowUpSelector::new(vec![policy]);

        selector.select(vec![site_flag(0, 1, 0.3)], date());
        let selection = selector.select(
            vec![on(1, site_flag(0, 1, 1.0)), on(1, site_flag(0, 2, 0.5))],
            date() + Duration::days(1),
        );
        assert_eq!(selection.instant, 1);
        assert_eq!(selection.sites.len(), 1);
        assert_eq!(selection.sites[0].facility, FacilityId(1));
        // The instant site leaves the watchlist; site 2 keeps waiting
        assert_eq!(selector.watched(MethodId(0)), 1);
    }
}
