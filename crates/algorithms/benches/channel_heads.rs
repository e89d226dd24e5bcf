//! Benchmarks for the channel extraction stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drainnet_algorithms::heads::DetectorKind;
use drainnet_algorithms::hydrology::{accumulate, fill, route};
use drainnet_algorithms::pipeline::{prepare, run_detector};
use drainnet_algorithms::spectral::wiener_filter;
use drainnet_algorithms::terrain::fit_curvature;
use drainnet_algorithms::ExtractionConfig;
use drainnet_core::{GeoTransform, Raster};

/// Tilted surface with regularly spaced valleys and a little texture
fn create_valley_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    for row in 0..size {
        for col in 0..size {
            let x = col as f64;
            let valleys = 4.0 * (x * std::f64::consts::TAU / 32.0).cos();
            let noise = ((row * 7 + col * 13) % 17) as f64 * 0.01;
            dem.set(row, col, 500.0 - 0.5 * row as f64 + valleys + noise)
                .unwrap();
        }
    }
    dem
}

fn bench_fill_route_accumulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/fill_route_accumulate");
    for size in [128, 256, 512] {
        let dem = create_valley_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let filled = fill(black_box(&dem), 0.0001).unwrap();
                let flow = route(&filled).unwrap();
                accumulate(&flow).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_curvature(c: &mut Criterion) {
    let mut group = c.benchmark_group("terrain/fit_curvature");
    let dem = create_valley_dem(256);
    for radius in [2.0, 6.0] {
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, &r| {
            b.iter(|| fit_curvature(black_box(&dem), r).unwrap())
        });
    }
    group.finish();
}

fn bench_wiener(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral/wiener_filter");
    for size in [128, 256] {
        let dem = create_valley_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| wiener_filter(black_box(&dem), None).unwrap())
        });
    }
    group.finish();
}

fn bench_area_threshold(c: &mut Criterion) {
    let config = ExtractionConfig {
        threshold_contributing_pixels: 200,
        ..Default::default()
    };
    let prepared = prepare(create_valley_dem(256), &config).unwrap();
    c.bench_function("heads/area_threshold_256", |b| {
        b.iter(|| run_detector(DetectorKind::AreaThreshold, black_box(&prepared), &config).unwrap())
    });
}

criterion_group!(
    benches,
    bench_fill_route_accumulate,
    bench_curvature,
    bench_wiener,
    bench_area_threshold
);
criterion_main!(benches);
