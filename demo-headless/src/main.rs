use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use ldar_sim_core::{
    run_batch, ConstantWeather, EventKind, Facility, FollowUpThreshold, MethodConfig,
    MethodLibrary, OperatorConfig, ProgramConfig, RedundancyFilter, SeasonalWeather, SimulationInputs,
    SimulationOutput, WeatherLookup, WeatherSample,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Program presets built from the standard method library
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Three OGI surveys per site and year
    Ogi,
    /// Truck screening with OGI follow-up
    TruckOgi,
    /// Satellite screening with OGI follow-up
    SatelliteOgi,
    /// Fixed sensors on every fifth site with OGI follow-up
    Continuous,
    /// Operator walk-arounds only
    None,
}

/// LDAR program simulation driver
#[derive(Parser, Debug)]
#[command(name = "ldar-sim-demo")]
#[command(about = "Headless LDAR program simulation", long_about = None)]
struct Args {
    /// Program preset
    #[arg(short, long, value_enum, default_value_t = Preset::Ogi)]
    preset: Preset,

    /// Number of independent replicates
    #[arg(short, long, default_value_t = 4)]
    replicates: usize,

    /// Seed of the first replicate (replicate i uses seed + i)
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Facilities in the synthetic portfolio
    #[arg(long, default_value_t = 200)]
    sites: u32,

    /// Resample the portfolio with replacement to this many sites
    #[arg(long)]
    site_samples: Option<usize>,

    /// First simulated year
    #[arg(long, default_value_t = 2017)]
    start_year: i32,

    /// Number of simulated years
    #[arg(short, long, default_value_t = 3)]
    years: u32,

    /// Survey crews per mobile method
    #[arg(short, long, default_value_t = 2)]
    crews: u32,

    /// Follow-up ratio applied to screening methods
    #[arg(long, default_value_t = 1.0)]
    follow_up_ratio: f64,

    /// Days screening candidates wait on the watchlist before ranking
    #[arg(long, default_value_t = 0)]
    follow_up_delay: u32,

    /// Apply weather envelopes using a seasonal Alberta climate
    #[arg(short, long)]
    weather: bool,

    /// Enable the weekly operator walk-around
    #[arg(long)]
    operator: bool,

    /// Route leaks reaching NRd into repair
    #[arg(long)]
    natural_repair: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    println!("=== LDAR Simulation Demo ===\n");

    let program = match build_program(&args) {
        Ok(program) => program,
        Err(err) => {
            error!(error = %err, "invalid program");
            std::process::exit(1);
        }
    };
    let weather: Arc<dyn WeatherLookup> = if args.weather {
        Arc::new(SeasonalWeather::alberta())
    } else {
        Arc::new(ConstantWeather(WeatherSample::new(10.0, 3.0, 0.0)))
    };
    let inputs = SimulationInputs::new(portfolio(args.sites, args.preset), weather);

    println!("Program:    {} ({:?})", program.name, args.preset);
    println!(
        "Horizon:    {} to {} ({} days)",
        program.start_date,
        program.end_date,
        program.horizon_days()
    );
    println!(
        "Methods:    {}",
        program
            .methods
            .iter()
            .map(|m| m.label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Facilities: {}", args.site_samples.unwrap_or(args.sites as usize));
    println!("Replicates: {}\n", args.replicates);

    let started = std::time::Instant::now();
    let results = run_batch(&program, &inputs, args.seed, args.replicates);
    info!(elapsed_ms = started.elapsed().as_millis(), "batch complete");

    println!(
        "{:>6} {:>8} {:>8} {:>10} {:>12} {:>14} {:>10}",
        "seed", "leaks", "repairs", "mean LDAR", "emit (t)", "cost ($)", "rejected"
    );
    let mut summaries = Vec::new();
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(output) => {
                let summary = Summary::from_output(output);
                println!(
                    "{:>6} {:>8} {:>8} {:>10.1} {:>12.1} {:>14.0} {:>10}",
                    output.seed,
                    summary.leaks_created,
                    summary.repairs,
                    summary.mean_active_leaks,
                    summary.emissions_tonnes,
                    summary.total_cost,
                    output.counters.rejected_by_ratio
                );
                summaries.push(summary);
            }
            Err(err) => println!("{:>6} failed: {err}", args.seed + i as u64),
        }
    }

    if summaries.is_empty() {
        return;
    }
    let n = summaries.len() as f64;
    println!("\n=== Batch means over {} replicates ===", summaries.len());
    println!(
        "Active leaks:  {:.1}",
        summaries.iter().map(|s| s.mean_active_leaks).sum::<f64>() / n
    );
    println!(
        "Emissions:     {:.1} t",
        summaries.iter().map(|s| s.emissions_tonnes).sum::<f64>() / n
    );
    println!(
        "Program cost:  ${:.0}",
        summaries.iter().map(|s| s.total_cost).sum::<f64>() / n
    );
    println!(
        "Surveys:       {:.0}",
        summaries.iter().map(|s| s.surveys as f64).sum::<f64>() / n
    );
    println!(
        "Weather holds: {:.0}",
        summaries.iter().map(|s| s.weather_blocks as f64).sum::<f64>() / n
    );

    if let Some(Ok(first)) = results.first() {
        println!("\n=== Campaigns of seed {} ===", first.seed);
        println!(
            "{:>12} {:>4} {:>12} {:>8} {:>6} {:>6} {:>8}",
            "method", "#", "start", "surveys", "flags", "tags", "repairs"
        );
        for c in &first.campaigns {
            let label = program
                .methods
                .get(c.method.index())
                .map_or("?", |m| m.label.as_str());
            println!(
                "{:>12} {:>4} {:>12} {:>8} {:>6} {:>6} {:>8}",
                label, c.index, c.start, c.surveys, c.flags, c.tags, c.repairs
            );
        }
    }
}

/// Assemble the program for the chosen preset
fn build_program(args: &Args) -> ldar_sim_core::SimResult<ProgramConfig> {
    let start = NaiveDate::from_ymd_opt(args.start_year, 1, 1).unwrap_or_default();
    let end = NaiveDate::from_ymd_opt(args.start_year + args.years.max(1) as i32 - 1, 12, 31)
        .unwrap_or_default();

    let threshold = FollowUpThreshold::Absolute(0.0);
    let screening = |method: MethodConfig| {
        method
            .with_follow_up(threshold, args.follow_up_ratio)
            .with_follow_up_delay(args.follow_up_delay, RedundancyFilter::Max)
    };
    let mut library = MethodLibrary::new();
    library
        .insert(MethodConfig::ogi("OGI").with_crews(args.crews))
        .insert(MethodConfig::ogi_follow_up("OGI_FU").with_crews(args.crews))
        .insert(screening(MethodConfig::truck("truck").with_crews(args.crews)))
        .insert(screening(MethodConfig::satellite("satellite")))
        .insert(screening(MethodConfig::continuous("continuous")));

    let labels: &[&str] = match args.preset {
        Preset::Ogi => &["OGI"],
        Preset::TruckOgi => &["truck", "OGI_FU"],
        Preset::SatelliteOgi => &["satellite", "OGI_FU"],
        Preset::Continuous => &["continuous", "OGI_FU"],
        Preset::None => &[],
    };

    let mut program = ProgramConfig::new(format!("P_{:?}", args.preset).to_lowercase(), start, end);
    program.methods = library.materialize(labels)?;
    program.consider_weather = args.weather;
    program.site_samples = args.site_samples;
    program.emissions.natural_repair = args.natural_repair;
    if args.operator {
        program.operator = Some(OperatorConfig {
            weekday: chrono::Weekday::Mon,
            strength: 0.2,
            max_det_op: 0.5,
        });
    }
    program.validate()?;
    Ok(program)
}

/// Synthetic portfolio laid out on a grid south of Calgary
fn portfolio(sites: u32, preset: Preset) -> Vec<Facility> {
    let columns = f64::from(sites).sqrt().ceil().max(1.0) as u32;
    (0..sites)
        .map(|i| {
            let lat = 50.5 + f64::from(i / columns) * 0.04;
            let lon = -114.5 + f64::from(i % columns) * 0.06;
            let production = if i % 3 == 0 { "oil" } else { "gas" };
            let mut facility = Facility::new(format!("F{i:05}"), lat, lon)
                .with_attribute("production", production)
                .with_equipment_groups(1 + i % 4);
            if preset == Preset::Continuous && i % 5 == 0 {
                facility = facility.with_fixed_sensors(1);
            }
            facility
        })
        .collect()
}

/// Per-replicate reduction of the ledger for display
struct Summary {
    leaks_created: usize,
    repairs: usize,
    surveys: usize,
    weather_blocks: usize,
    mean_active_leaks: f64,
    emissions_tonnes: f64,
    total_cost: f64,
}

impl Summary {
    fn from_output(output: &SimulationOutput) -> Self {
        let mut summary = Summary {
            leaks_created: 0,
            repairs: 0,
            surveys: 0,
            weather_blocks: 0,
            mean_active_leaks: 0.0,
            emissions_tonnes: 0.0,
            total_cost: 0.0,
        };
        for event in &output.events {
            match event.kind {
                EventKind::LeakCreated { .. } => summary.leaks_created += 1,
                EventKind::Repaired { .. } => summary.repairs += 1,
                EventKind::Surveyed { .. } => summary.surveys += 1,
                EventKind::WeatherBlocked { .. } => summary.weather_blocks += 1,
                _ => {}
            }
        }
        let days = output.snapshots.len().max(1) as f64;
        for snapshot in &output.snapshots {
            summary.mean_active_leaks += snapshot.active_leaks as f64 / days;
            summary.emissions_tonnes += (*snapshot.leak_emissions + *snapshot.vent_emissions) / 1000.0;
            summary.total_cost += snapshot.cost;
        }
        summary
    }
}
