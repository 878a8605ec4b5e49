//! Screening plus follow-up programs and input validation failures
//!
//! Run tests with: cargo test --test `follow_up_programs`

use chrono::NaiveDate;
use ldar_sim_core::{
    ConstantWeather, DailyWeatherTable, EventKind, Facility, FacilityId, FollowUpThreshold,
    GeoPoint, MethodConfig, MethodId, ProgramConfig, RateDistribution, RedundancyFilter,
    SimError, Simulation, SimulationInputs, SimulationOutput, WeatherSample,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const SCREENING: MethodId = MethodId(0);
const FOLLOW_UP: MethodId = MethodId(1);

fn inputs(n: u32) -> SimulationInputs {
    let facilities = (0..n)
        .map(|i| {
            Facility::new(
                format!("pad-{i}"),
                51.0 + f64::from(i % 6) * 0.05,
                -114.0 - f64::from(i / 6) * 0.05,
            )
            .with_equipment_groups(2)
        })
        .collect();
    SimulationInputs::new(
        facilities,
        Arc::new(ConstantWeather(WeatherSample::new(8.0, 4.0, 0.0))),
    )
}

fn screening_program(ratio: f64) -> ProgramConfig {
    ProgramConfig::new(
        "truck-ogi",
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    )
    .with_method(MethodConfig::truck("truck").with_follow_up(FollowUpThreshold::Absolute(0.0), ratio))
    .with_method(MethodConfig::ogi_follow_up("OGI_FU"))
}

fn run(program: &ProgramConfig, seed: u64) -> SimulationOutput {
    Simulation::build(program, &inputs(30), seed)
        .and_then(Simulation::run)
        .unwrap()
}

fn site_flags(output: &SimulationOutput, method: MethodId) -> usize {
    output
        .events
        .iter()
        .filter(|e| {
            matches!(e.kind, EventKind::Flagged { method: m, leak: None, .. } if m == method)
        })
        .count()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Follow-up eligibility
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_follow_up_only_surveys_flagged_sites() {
    let output = run(&screening_program(0.5), 17);

    let mut pending: HashSet<FacilityId> = HashSet::new();
    let mut follow_ups = 0;
    for event in &output.events {
        match event.kind {
            EventKind::Flagged {
                method,
                facility,
                leak: None,
                ..
            } if method == SCREENING => {
                pending.insert(facility);
            }
            EventKind::Surveyed {
                method, facility, ..
            } if method == FOLLOW_UP => {
                assert!(
                    pending.remove(&facility),
                    "follow-up surveyed unflagged site {facility} on {}",
                    event.date
                );
                follow_ups += 1;
            }
            _ => {}
        }
    }
    assert!(follow_ups > 0, "expected at least one follow-up survey");
}

#[test]
fn test_follow_up_attributes_leaks_to_screening_method() {
    let output = run(&screening_program(1.0), 23);
    let attributed = output.events.iter().any(|e| {
        matches!(
            e.kind,
            EventKind::Tagged {
                initially_detected_by: Some(m),
                ..
            } if m == SCREENING
        )
    });
    assert!(attributed);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Survey quota accounting
// ═══════════════════════════════════════════════════════════════════════════════

fn quota_misses(output: &SimulationOutput, method: MethodId) -> Vec<FacilityId> {
    output
        .events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::SurveyQuotaMissed {
                method: m, facility, ..
            } if m == method => Some(facility),
            _ => None,
        })
        .collect()
}

#[test]
fn test_follow_up_method_has_no_survey_quota() {
    let output = run(&screening_program(1.0), 17);
    assert!(quota_misses(&output, FOLLOW_UP).is_empty());
}

#[test]
fn test_sites_without_sensors_have_no_stationary_quota() {
    let program = ProgramConfig::new(
        "continuous-ogi",
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    )
    .with_method(MethodConfig::continuous("continuous"))
    .with_method(MethodConfig::ogi_follow_up("OGI_FU"));
    let mut inputs = inputs(10);
    inputs.facilities[3] = inputs.facilities[3].clone().with_fixed_sensors(1);
    inputs.facilities[7] = inputs.facilities[7].clone().with_fixed_sensors(1);

    let sim = Simulation::build(&program, &inputs, 9).unwrap();
    let equipped: HashSet<FacilityId> = sim
        .facilities()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.fixed_sensors > 0)
        .map(|(idx, _)| FacilityId(idx as u32))
        .collect();
    let output = sim.run().unwrap();

    assert!(quota_misses(&output, SCREENING)
        .iter()
        .all(|f| equipped.contains(f)));
    assert!(quota_misses(&output, FOLLOW_UP).is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ratio triage
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_ratio_extremes() {
    let all = run(&screening_program(1.0), 5);
    assert_eq!(all.counters.rejected_by_ratio, 0);
    assert!(site_flags(&all, SCREENING) > 0);

    let none = run(&screening_program(0.0), 5);
    assert_eq!(site_flags(&none, SCREENING), 0);
    assert!(none.counters.rejected_by_ratio > 0);
    assert!(!none.events.iter().any(|e| {
        matches!(e.kind, EventKind::Surveyed { method, .. } if method == FOLLOW_UP)
    }));
}

#[test]
fn test_half_ratio_keeps_floor_half_each_day() {
    let output = run(&screening_program(0.5), 31);
    let mut kept_per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for event in &output.events {
        if matches!(event.kind, EventKind::Flagged { method, leak: None, .. } if method == SCREENING) {
            *kept_per_day.entry(event.date).or_default() += 1;
        }
    }
    let mut ranked_days = 0;
    for snapshot in &output.snapshots {
        let kept = kept_per_day.get(&snapshot.date).copied().unwrap_or(0);
        assert_eq!(kept, snapshot.released_flags / 2, "on {}", snapshot.date);
        assert_eq!(snapshot.rejected_flags, snapshot.released_flags - kept);
        if snapshot.released_flags > 1 {
            ranked_days += 1;
        }
    }
    assert!(ranked_days > 0);
    assert!(output.counters.rejected_by_ratio > 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Watchlist delay and instant flags
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_delayed_watchlist_releases_in_batches() {
    let program = ProgramConfig::new(
        "truck-ogi-delayed",
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    )
    .with_method(
        MethodConfig::truck("truck")
            .with_follow_up(FollowUpThreshold::Absolute(0.0), 1.0)
            .with_follow_up_delay(7, RedundancyFilter::Max),
    )
    .with_method(MethodConfig::ogi_follow_up("OGI_FU"));
    let output = run(&program, 41);

    let release_days: Vec<NaiveDate> = output
        .snapshots
        .iter()
        .filter(|s| s.released_flags > 0)
        .map(|s| s.date)
        .collect();
    assert!(release_days.len() > 1);
    for pair in release_days.windows(2) {
        assert!((pair[1] - pair[0]).num_days() >= 7, "{pair:?}");
    }
    for event in &output.events {
        if matches!(event.kind, EventKind::Flagged { method, leak: None, .. } if method == SCREENING) {
            assert!(release_days.contains(&event.date));
        }
    }
    assert_eq!(output.counters.instant_flags, 0);
}

#[test]
fn test_instant_threshold_skips_ratio_cut() {
    let program = ProgramConfig::new(
        "truck-ogi-instant",
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    )
    .with_method(
        MethodConfig::truck("truck")
            .with_follow_up(FollowUpThreshold::Absolute(0.0), 0.0)
            .with_follow_up_delay(30, RedundancyFilter::Recent)
            .with_instant_threshold(0.0),
    )
    .with_method(MethodConfig::ogi_follow_up("OGI_FU"));
    let output = run(&program, 5);

    assert_eq!(output.counters.rejected_by_ratio, 0);
    assert!(output.counters.instant_flags > 0);
    assert_eq!(site_flags(&output, SCREENING) as u64, output.counters.instant_flags);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fatal input errors
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unmatched_category_aborts_replicate() {
    let mut program = screening_program(1.0);
    program.emissions.leak_rates = RateDistribution::Categorized {
        attribute: "production".to_string(),
        buckets: BTreeMap::from([("gas".to_string(), vec![0.1, 0.2])]),
    };
    let facilities = vec![
        Facility::new("gas-pad", 51.0, -114.0).with_attribute("production", "gas"),
        Facility::new("oil-pad", 51.1, -114.1).with_attribute("production", "oil"),
    ];
    let inputs = SimulationInputs::new(
        facilities,
        Arc::new(ConstantWeather(WeatherSample::new(8.0, 4.0, 0.0))),
    );
    let err = Simulation::build(&program, &inputs, 1).err().unwrap();
    match err {
        SimError::DistributionMismatch {
            facility, category, ..
        } => {
            assert_eq!(facility, "oil-pad");
            assert_eq!(category, "oil");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_short_weather_record_is_rejected() {
    let mut program = screening_program(1.0);
    program.consider_weather = true;
    let table = DailyWeatherTable::single_cell(
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        GeoPoint::new(51.0, -114.0),
        vec![WeatherSample::new(5.0, 2.0, 0.0); 90],
    )
    .unwrap();
    let inputs = SimulationInputs::new(inputs(4).facilities, Arc::new(table));
    let err = Simulation::build(&program, &inputs, 1).err().unwrap();
    assert!(matches!(err, SimError::WeatherCoverage { .. }), "{err}");
}

#[test]
fn test_invalid_program_is_a_configuration_error() {
    let mut program = screening_program(1.0);
    program.end_date = NaiveDate::from_ymd_opt(2017, 6, 1).unwrap();
    let err = Simulation::build(&program, &inputs(3), 1).err().unwrap();
    assert!(matches!(err, SimError::Configuration { .. }));

    let empty = SimulationInputs::new(Vec::new(), inputs(1).weather);
    let err = Simulation::build(&screening_program(1.0), &empty, 1).err().unwrap();
    assert!(matches!(err, SimError::Configuration { .. }));
}
