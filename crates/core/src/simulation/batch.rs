//! Parallel batch of independent replicates

use super::{Simulation, SimulationInputs, SimulationOutput};
use crate::config::program::ProgramConfig;
use crate::error::SimResult;
use rayon::prelude::*;
use tracing::{info, warn};

/// Run `replicates` independent replicates of `program`.
///
/// Replicate `i` is seeded with `base_seed + i`. Results come back in replicate
/// order; a replicate that fails does not affect the others.
pub fn run_batch(
    program: &ProgramConfig,
    inputs: &SimulationInputs,
    base_seed: u64,
    replicates: usize,
) -> Vec<SimResult<SimulationOutput>> {
    info!(program = %program.name, replicates, base_seed, "batch started");
    let results: Vec<SimResult<SimulationOutput>> = (0..replicates)
        .into_par_iter()
        .map(|i| {
            let seed = base_seed.wrapping_add(i as u64);
            let result = Simulation::build(program, inputs, seed).and_then(Simulation::run);
            if let Err(err) = &result {
                warn!(seed, error = %err, "replicate failed");
            }
            result
        })
        .collect();
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(program = %program.name, replicates, failed, "batch finished");
    results
}
