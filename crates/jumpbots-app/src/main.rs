//! Headless evolution shell: seeds a population of MLP policies, evaluates
//! each generation in the simulation core, and breeds the next one.

use anyhow::Result;
use jumpbots_brain::{MlpPolicy, into_runner};
use jumpbots_core::{AgentId, JumpbotsConfig, World};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::collections::HashMap;
use tracing::{info, warn};

const POPULATION_SIZE: usize = 50;
const GENERATIONS: usize = 25;
const SURVIVOR_COUNT: usize = 12;
const MUTATION_RATE: f32 = 0.08;
const MUTATION_SCALE: f32 = 0.3;
const MAX_TICKS_PER_GENERATION: u64 = 10_000;
const RUN_SEED: u64 = 0x4A55_4D50;

fn main() -> Result<()> {
    init_tracing();
    info!("Starting jumpbots evolution shell");

    let config = JumpbotsConfig {
        rng_seed: Some(RUN_SEED),
        ..JumpbotsConfig::default()
    };
    config.validate()?;

    let mut rng = SmallRng::seed_from_u64(RUN_SEED);
    let mut pool: Vec<MlpPolicy> = (0..POPULATION_SIZE)
        .map(|_| MlpPolicy::random(&mut rng))
        .collect();

    for generation in 0..GENERATIONS {
        let mut world = World::new(config.clone())?;
        let ids = world.spawn_population(pool.iter().cloned().map(into_runner));

        let results = evaluate_generation(&mut world, MAX_TICKS_PER_GENERATION);
        let mut ranked = rank_members(&ids, &results);
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let best = ranked.first().map_or(0.0, |(_, fitness)| *fitness);
        let mean = if ranked.is_empty() {
            0.0
        } else {
            ranked.iter().map(|(_, fitness)| fitness).sum::<f32>() / ranked.len() as f32
        };
        info!(
            generation,
            ticks = world.tick().0,
            score = world.score(),
            best_fitness = best,
            mean_fitness = mean,
            "Generation complete",
        );

        pool = breed_next_pool(&pool, &ranked, &mut rng);
    }

    info!("Evolution run complete");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Drive one generation to extinction (or the tick cap) and collect the final
/// fitness for every member, eliminated or still alive at the cap.
fn evaluate_generation(world: &mut World, max_ticks: u64) -> HashMap<AgentId, f32> {
    while !world.population().is_empty() && world.tick().0 < max_ticks {
        world.step();
    }
    if !world.population().is_empty() {
        warn!(
            live = world.population().len(),
            "Generation hit the tick cap with survivors"
        );
    }

    let mut results: HashMap<AgentId, f32> = world
        .verdicts()
        .iter()
        .map(|verdict| (verdict.id, verdict.fitness))
        .collect();
    for id in world.population().iter_handles() {
        if let Some(fitness) = world.fitness_of(id) {
            results.insert(id, fitness);
        }
    }
    results
}

/// Pair each pool index with the fitness its agent earned.
fn rank_members(ids: &[AgentId], results: &HashMap<AgentId, f32>) -> Vec<(usize, f32)> {
    ids.iter()
        .enumerate()
        .map(|(index, id)| (index, results.get(id).copied().unwrap_or(f32::MIN)))
        .collect()
}

/// Truncation selection: survivors carry over unchanged, offspring are bred
/// from random survivor pairs by uniform crossover plus gaussian mutation.
fn breed_next_pool(
    pool: &[MlpPolicy],
    ranked: &[(usize, f32)],
    rng: &mut SmallRng,
) -> Vec<MlpPolicy> {
    let survivor_count = SURVIVOR_COUNT.min(ranked.len()).max(1);
    let survivors: Vec<MlpPolicy> = ranked
        .iter()
        .take(survivor_count)
        .map(|(index, _)| pool[*index].clone())
        .collect();

    let mut next = survivors.clone();
    while next.len() < POPULATION_SIZE {
        let parent_a = &survivors[rng.random_range(0..survivors.len())];
        let parent_b = &survivors[rng.random_range(0..survivors.len())];
        let mut child = parent_a.recombine(parent_b, rng);
        child.perturb(rng, MUTATION_RATE, MUTATION_SCALE);
        next.push(child);
    }
    next
}
