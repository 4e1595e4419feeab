use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use starmatch::{CatalogPoint, Context, Correlator, DetectedPoint, SimpleWcs, SkyCoord};

fn field() -> (Context, Vec<DetectedPoint>, Vec<CatalogPoint>) {
    let mut rng = StdRng::seed_from_u64(1);
    let center = SkyCoord::from_degrees_hours(38., 18.6);
    let truth = SimpleWcs::new(center, 1.5, rng.random_range(-3.1..3.1), 1000., 1000.);

    let mut stars = Vec::new();
    let mut catalog = Vec::new();
    for i in 0..40 {
        let (x, y) = (rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0));
        let magnitude: f64 = rng.random_range(9.0..14.0);
        catalog.push(CatalogPoint::new(format!("s{i}"), truth.pixel_to_world(x, y), magnitude));
        stars.push(DetectedPoint::new(x, y, 10f64.powf(-0.4 * (magnitude - 20.))));
    }
    for i in 0..40 {
        let (x, y) = (rng.random_range(-1000.0..2000.0), rng.random_range(-1000.0..2000.0));
        let magnitude: f64 = rng.random_range(9.0..14.0);
        catalog.push(CatalogPoint::new(format!("f{i}"), truth.pixel_to_world(x, y), magnitude));
    }

    (Context::new(1000., 1000., center), stars, catalog)
}

fn correlate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate");
    group.sample_size(10);

    let (ctx, stars, catalog) = field();
    group.bench_function("correlate parallel", |b| {
        let correlator = Correlator::new(ctx.clone());
        b.iter_batched(
            || stars.clone(),
            |mut s| correlator.correlate(&mut s, &catalog),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("correlate single task", |b| {
        let correlator = Correlator::new(ctx.clone()).with_workers(1);
        b.iter_batched(
            || stars.clone(),
            |mut s| correlator.correlate(&mut s, &catalog),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, correlate_benchmark);
criterion_main!(benches);
