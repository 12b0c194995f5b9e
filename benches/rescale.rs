use criterion::*;
use std::hint::black_box;
use std::sync::Arc;

use canvas_scaler::config::PipelineConfig;
use canvas_scaler::scaling::{
    blended_scale, AxisBlendWeight, ManualViewport, ReferenceResolution, RescalePipeline, Transform, ViewportSize,
};

const CANVASES_SMALL: usize = 10_000;
const CANVASES_LARGE: usize = 1_000_000;

fn make_pipeline(canvases: usize) -> (Arc<ManualViewport>, RescalePipeline) {
    let viewport = Arc::new(ManualViewport::new(800, 600));
    let mut pipeline = RescalePipeline::new(viewport.clone(), &PipelineConfig::default()).unwrap();
    for i in 0..canvases {
        pipeline
            .spawn_scalable(
                ReferenceResolution::new(800.0, 600.0).unwrap(),
                AxisBlendWeight::new((i % 101) as f32 / 100.0).unwrap(),
                Transform::default(),
            )
            .unwrap();
    }
    (viewport, pipeline)
}

fn rescale_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rescale");

    group.bench_function("blended_scale", |b| {
        let reference = ReferenceResolution::new(800.0, 600.0).unwrap();
        let weight = AxisBlendWeight::new(0.5).unwrap();
        let viewport = ViewportSize::new(1600, 900).unwrap();
        b.iter(|| blended_scale(black_box(&reference), black_box(weight), black_box(viewport)))
    });

    for &canvases in &[CANVASES_SMALL, CANVASES_LARGE] {
        group.throughput(Throughput::Elements(canvases as u64));

        group.bench_with_input(BenchmarkId::new("resize_tick", canvases), &canvases, |b, &canvases| {
            let (viewport, mut pipeline) = make_pipeline(canvases);
            let mut wide = false;
            b.iter(|| {
                wide = !wide;
                viewport.set(if wide { 1600 } else { 800 }, 600);
                black_box(pipeline.tick().unwrap());
            })
        });

        group.bench_with_input(BenchmarkId::new("idle_tick", canvases), &canvases, |b, &canvases| {
            let (_viewport, mut pipeline) = make_pipeline(canvases);
            b.iter(|| black_box(pipeline.tick().unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, rescale_benchmark);
criterion_main!(benches);
