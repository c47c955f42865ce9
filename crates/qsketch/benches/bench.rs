use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use qsketch::{
    Batch, DataSource, EpochSize, LinearProjections, ModuleSource, Percentiles, Sketcher,
    StreamConfig, WorkerCount, compute_sketch,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{sync::Arc, time::Instant};

const INPUT_DIM: usize = 64;
const NUM_PROJECTIONS: usize = 16;
const DATASET_SIZE: usize = 20_000;
const SKETCHES_PER_EPOCH: usize = 64;

fn dataset() -> Batch {
    let mut rng = StdRng::seed_from_u64(0);
    let data = (0..DATASET_SIZE * INPUT_DIM)
        .map(|_| rng.random::<f32>() - 0.5)
        .collect();
    Batch::new(data, INPUT_DIM).expect("valid dataset")
}

/// On-demand sketch of a single projector for several sample budgets.
fn bench_compute_sketch(c: &mut Criterion) {
    let data = DataSource::tensor(dataset());
    let percentiles = Percentiles::linspace(100).expect("valid percentiles");
    let modules = LinearProjections::new(INPUT_DIM, NUM_PROJECTIONS);
    let mut group = c.benchmark_group("compute_sketch");

    for num_examples in [1_000, 3_000, 10_000] {
        group.throughput(Throughput::Elements(num_examples as u64));
        group.bench_function(format!("examples/{num_examples}"), |b| {
            let mut projector = modules.get(1);
            b.iter(|| {
                let sketch =
                    compute_sketch(&mut projector, data.open(), &percentiles, Some(num_examples))
                        .expect("sketch");
                black_box(sketch);
            });
        });
    }

    group.finish();
}

/// One bounded epoch streamed by pools of increasing size.
fn bench_stream_epoch(c: &mut Criterion) {
    let percentiles = Percentiles::linspace(100).expect("valid percentiles");
    let mut sketcher = Sketcher::new(
        Some(DataSource::tensor(dataset())),
        percentiles,
        Some(3_000),
    );
    let modules = Arc::new(LinearProjections::new(INPUT_DIM, NUM_PROJECTIONS));
    let mut group = c.benchmark_group("stream_epoch");
    group.sample_size(10);

    for workers in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(SKETCHES_PER_EPOCH as u64));
        group.bench_function(
            format!("sketches/{SKETCHES_PER_EPOCH}/workers/{workers}"),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let config = StreamConfig::new(EpochSize::Bounded(SKETCHES_PER_EPOCH), 1)
                            .with_workers(WorkerCount::Fixed(workers));
                        let rx = sketcher
                            .stream(Arc::clone(&modules), config)
                            .expect("stream");
                        for message in rx {
                            black_box(message);
                        }
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compute_sketch, bench_stream_epoch);
criterion_main!(benches);
