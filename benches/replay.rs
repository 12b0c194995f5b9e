use criterion::*;
use std::hint::black_box;

use rayon::prelude::*;

use canvas_scaler::engine::commands::Command;
use canvas_scaler::engine::component::{register_component, Bundle};
use canvas_scaler::engine::manager::ECSManager;

const COMMANDS: usize = 100_000;

#[derive(Clone, Copy)]
struct Marker;

#[allow(dead_code)]
#[derive(Clone, Copy)]
struct Payload {
    value: u64,
}

fn replay_benchmark(c: &mut Criterion) {
    register_component::<Marker>().unwrap();
    register_component::<Payload>().unwrap();

    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(COMMANDS as u64));

    group.bench_function("parallel_enqueue_100k", |b| {
        b.iter_batched(
            ECSManager::default,
            |ecs| {
                (0..COMMANDS as u64).into_par_iter().for_each(|value| {
                    let bundle = Bundle::new().with(Marker).unwrap().with(Payload { value }).unwrap();
                    ecs.world_ref().defer(Command::Spawn { bundle }).unwrap();
                });
                black_box(ecs.commands().len())
            },
            BatchSize::LargeInput,
        )
    });

    group.bench_function("replay_spawn_then_despawn_100k", |b| {
        b.iter_batched(
            || {
                let ecs = ECSManager::default();
                for value in 0..COMMANDS as u64 {
                    let bundle = Bundle::new().with(Marker).unwrap().with(Payload { value }).unwrap();
                    ecs.world_ref().defer(Command::Spawn { bundle }).unwrap();
                }
                ecs
            },
            |mut ecs| {
                let report = ecs.apply_deferred_commands().unwrap();
                for &entity in &report.spawned {
                    ecs.world_ref().defer(Command::Despawn { entity }).unwrap();
                }
                black_box(ecs.apply_deferred_commands().unwrap())
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, replay_benchmark);
criterion_main!(benches);
