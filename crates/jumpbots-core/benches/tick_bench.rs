use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use jumpbots_core::{ACTION_COUNT, JumpbotsConfig, PolicyRunner, SensorReading, World};

struct NeutralPolicy;

impl PolicyRunner for NeutralPolicy {
    fn kind(&self) -> &'static str {
        "bench.neutral"
    }

    fn decide(&mut self, _inputs: &SensorReading) -> [f32; ACTION_COUNT] {
        [0.0, 0.0, 1.0]
    }
}

fn bench_world_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    let steps: usize = std::env::var("JB_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64);
    for &population in &[16_usize, 64, 256] {
        group.bench_function(format!("steps{steps}_agents{population}"), |b| {
            b.iter_batched(
                || {
                    let config = JumpbotsConfig {
                        rng_seed: Some(0xBEEF),
                        stagnation_threshold: 100_000,
                        ..JumpbotsConfig::default()
                    };
                    let mut world = World::new(config).expect("world");
                    for _ in 0..population {
                        world.spawn_member(Box::new(NeutralPolicy));
                    }
                    world
                },
                |mut world| {
                    for _ in 0..steps {
                        world.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_world_steps);
criterion_main!(benches);
