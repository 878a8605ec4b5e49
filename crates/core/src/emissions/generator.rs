//! Leak emergence: initial seeding, daily production and natural repair

use crate::config::EmissionsConfig;
use crate::core_types::facility::Facility;
use crate::core_types::ids::LeakId;
use crate::core_types::units::GramsPerSecond;
use crate::emissions::pool::LeakPool;
use crate::error::SimResult;
use crate::random::RandomSource;
use chrono::{Duration, NaiveDate};
use tracing::trace;

/// Creates leaks from the configured production rate and size distributions
#[derive(Debug, Clone)]
pub struct LeakGenerator<'a> {
    config: &'a EmissionsConfig,
}

impl<'a> LeakGenerator<'a> {
    pub fn new(config: &'a EmissionsConfig) -> Self {
        Self { config }
    }

    /// Draw one leak rate for `facility`, capped at the maximum leak rate
    fn sample_rate(&self, facility: &Facility, rng: &mut RandomSource) -> SimResult<GramsPerSecond> {
        let rate = self.config.leak_rates.sample(facility, rng, "leak rate")?;
        Ok(rate.capped(GramsPerSecond::new(self.config.max_leak_rate)))
    }

    /// Draw the design vent rate of every facility (zero when venting is off)
    pub fn vent_rates(
        &self,
        facilities: &[Facility],
        rng: &mut RandomSource,
    ) -> SimResult<Vec<GramsPerSecond>> {
        match &self.config.venting {
            None => Ok(vec![GramsPerSecond::ZERO; facilities.len()]),
            Some(dist) => facilities
                .iter()
                .map(|f| dist.sample(f, rng, "vent rate"))
                .collect(),
        }
    }

    /// Seed pre-existing leaks.
    ///
    /// Each initial leak is given an age drawn uniformly from `[0, NRd)` and a
    /// creation date back-dated from `start` accordingly.
    pub fn seed_initial(
        &self,
        facilities: &[Facility],
        pool: &mut LeakPool,
        start: NaiveDate,
        rng: &mut RandomSource,
    ) -> SimResult<Vec<LeakId>> {
        let mut created = Vec::new();
        for facility in facilities {
            let count = self.config.initial_leaks.sample(
                facility,
                self.config.lpr,
                self.config.nrd_days,
                rng,
            )?;
            for _ in 0..count {
                let rate = self.sample_rate(facility, rng)?;
                let group = rng.index(facility.equipment_groups as usize) as u32;
                let age = rng.index(self.config.nrd_days as usize) as i64;
                let began = start - Duration::days(age);
                created.push(pool.insert(facility.id, group, rate, began));
            }
        }
        Ok(created)
    }

    /// One Bernoulli(LPR) trial per facility; successes create a leak dated `today`
    pub fn generate_new_leaks(
        &self,
        facilities: &[Facility],
        pool: &mut LeakPool,
        today: NaiveDate,
        rng: &mut RandomSource,
    ) -> SimResult<Vec<LeakId>> {
        let mut created = Vec::new();
        for facility in facilities {
            if !rng.bernoulli(self.config.lpr) {
                continue;
            }
            let rate = self.sample_rate(facility, rng)?;
            let group = rng.index(facility.equipment_groups as usize) as u32;
            let id = pool.insert(facility.id, group, rate, today);
            trace!(leak = %id, facility = %facility.id, rate = %rate, "new leak");
            created.push(id);
        }
        Ok(created)
    }

    /// Untagged leaks whose age has reached the natural repair horizon
    pub fn due_for_natural_repair(&self, pool: &LeakPool, today: NaiveDate) -> Vec<LeakId> {
        if !self.config.natural_repair {
            return Vec::new();
        }
        let nrd = i64::from(self.config.nrd_days);
        pool.iter()
            .filter(|l| !l.is_tagged() && l.age_days(today) >= nrd)
            .map(|l| l.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ids::FacilityId;
    use crate::distribution::{InitialLeakCount, RateDistribution};

    fn facilities(n: u32) -> Vec<Facility> {
        (0..n)
            .map(|i| {
                let mut f = Facility::new(format!("s{i}"), 50.0, -110.0).with_equipment_groups(3);
                f.id = FacilityId(i);
                f
            })
            .collect()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()
    }

    #[test]
    fn test_rates_are_capped() {
        let config = EmissionsConfig {
            lpr: 1.0,
            max_leak_rate: 0.5,
            leak_rates: RateDistribution::Empirical {
                samples: vec![10.0],
            },
            initial_leaks: InitialLeakCount::None,
            ..EmissionsConfig::default()
        };
        let sites = facilities(4);
        let mut pool = LeakPool::new(&[3; 4], &[]);
        let mut rng = RandomSource::seeded(1);
        let generator = LeakGenerator::new(&config);
        let ids = generator
            .generate_new_leaks(&sites, &mut pool, start(), &mut rng)
            .unwrap();
        assert_eq!(ids.len(), 4);
        for id in ids {
            let leak = pool.get(id).unwrap();
            assert_eq!(*leak.rate, 0.5);
            assert!(leak.equipment_group < 3);
        }
    }

    #[test]
    fn test_zero_lpr_creates_nothing() {
        let config = EmissionsConfig {
            lpr: 0.0,
            ..EmissionsConfig::default()
        };
        let sites = facilities(10);
        let mut pool = LeakPool::new(&[3; 10], &[]);
        let mut rng = RandomSource::seeded(3);
        let generator = LeakGenerator::new(&config);
        for d in 0..30 {
            let today = start() + Duration::days(d);
            assert!(generator
                .generate_new_leaks(&sites, &mut pool, today, &mut rng)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_initial_leaks_are_back_dated_within_nrd() {
        let config = EmissionsConfig {
            lpr: 0.05,
            nrd_days: 100,
            initial_leaks: InitialLeakCount::SteadyState,
            ..EmissionsConfig::default()
        };
        let sites = facilities(50);
        let mut pool = LeakPool::new(&[3; 50], &[]);
        let mut rng = RandomSource::seeded(8);
        let ids = LeakGenerator::new(&config)
            .seed_initial(&sites, &mut pool, start(), &mut rng)
            .unwrap();
        assert!(!ids.is_empty());
        for id in ids {
            let age = pool.get(id).unwrap().age_days(start());
            assert!((0..100).contains(&age), "age {age}");
        }
    }

    #[test]
    fn test_natural_repair_due_at_horizon() {
        let config = EmissionsConfig {
            nrd_days: 10,
            natural_repair: true,
            ..EmissionsConfig::default()
        };
        let mut pool = LeakPool::new(&[1], &[]);
        let id = pool.insert(FacilityId(0), 0, GramsPerSecond::new(0.1), start());
        let generator = LeakGenerator::new(&config);
        assert!(generator
            .due_for_natural_repair(&pool, start() + Duration::days(9))
            .is_empty());
        assert_eq!(
            generator.due_for_natural_repair(&pool, start() + Duration::days(10)),
            vec![id]
        );
    }
}
