use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use marker_core::{
    GeoBounds, GridTerrain, MarkerLayer, NoisyTerrain, PlacementConfig, PositionUpdate, Relief,
};

const CENTER: (f64, f64) = (139.767, 35.681);

fn fleet_layer(size: usize) -> MarkerLayer {
    let grid = GridTerrain::generate(
        GeoBounds::around(CENTER.0, CENTER.1, 0.05),
        256,
        256,
        Relief::default(),
        7,
    )
    .with_exaggeration(1.6);
    let terrain = NoisyTerrain::new(grid, 0.4, 0.05, 7);
    let mut layer = MarkerLayer::new(PlacementConfig::default(), terrain);
    for i in 0..size {
        let offset = i as f64 * 0.0001;
        layer.upsert(
            PositionUpdate::new(format!("bus-{i}"), CENTER.0 + offset, CENTER.1 - offset)
                .with_bearing((i * 15 % 360) as f64),
        );
    }
    layer
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");

    for size in [16usize, 128, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("fleet", size), &size, |b, &size| {
            b.iter_batched(
                || fleet_layer(size),
                |mut layer| {
                    layer.force_refresh();
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(refresh_benches, bench_refresh);
criterion_main!(refresh_benches);
