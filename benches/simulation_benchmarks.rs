use archipelago_sim::{SimulationConfig, SimulationEngine};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// Benchmark world initialization across archipelago sizes
fn bench_world_initialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_initialization");

    for size in [2, 6, 12].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let config = SimulationConfig {
                    island_count: size,
                    agent_count: 3,
                    seed: 42,
                    ..Default::default()
                };
                black_box(SimulationEngine::new(config).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark a single tick
fn bench_single_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_tick");

    for size in [2, 6, 12].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let config = SimulationConfig {
                island_count: size,
                agent_count: 3,
                seed: 42,
                ..Default::default()
            };

            b.iter_batched(
                || SimulationEngine::new(config.clone()).unwrap(),
                |mut engine| {
                    engine.step();
                    black_box(engine);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark a 100-tick run including the agent layer
fn bench_hundred_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("hundred_ticks");
    group.sample_size(10);

    let config = SimulationConfig {
        island_count: 6,
        agent_count: 3,
        max_ticks: 100,
        seed: 42,
        ..Default::default()
    };

    group.bench_function("default_world", |b| {
        b.iter_batched(
            || SimulationEngine::new(config.clone()).unwrap(),
            |mut engine| {
                engine.run();
                black_box(engine);
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark the state hash on its own
fn bench_state_hash(c: &mut Criterion) {
    let config = SimulationConfig { island_count: 12, agent_count: 6, ..Default::default() };
    let engine = SimulationEngine::new(config).unwrap();

    c.bench_function("state_hash", |b| {
        b.iter(|| black_box(engine.world().state_hash()));
    });
}

criterion_group!(
    benches,
    bench_world_initialization,
    bench_single_tick,
    bench_hundred_ticks,
    bench_state_hash
);
criterion_main!(benches);
