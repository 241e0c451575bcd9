use collabscore::prelude::*;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_qr_quantile(c: &mut Criterion) {
    let mut group = c.benchmark_group("qr_quantile");

    for &n_voters in &[10usize, 1_000, 100_000] {
        let sample = Sample::from_scores((0..n_voters).map(|i| {
            let x = i as f64;
            (Score::symmetric(x.sin() * 10.0, 0.5 + 0.5 * x.cos().abs()), 1.0)
        }));
        group.bench_with_input(BenchmarkId::new("q0.2", n_voters), &sample, |b, sample| {
            b.iter(|| qr_quantile(0.1, 0.2, sample, 0.0, 1e-5).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("uncertainty", n_voters), &sample, |b, sample| {
            b.iter(|| qr_uncertainty(0.1, sample, 1.0, 1e-5, None).unwrap())
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for &(n_users, n_entities) in &[(10usize, 20usize), (50, 100)] {
        let poll = SyntheticPollConfig {
            n_users,
            n_entities,
            ..SyntheticPollConfig::default()
        }
        .generate()
        .unwrap()
        .poll;
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let cancel = CancellationToken::new();

        let id = format!("{}u_{}e", n_users, n_entities);
        group.bench_with_input(BenchmarkId::new("run", &id), &poll, |b, poll| {
            b.iter(|| pipeline.run(poll, &cancel).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_qr_quantile, bench_pipeline);
criterion_main!(benches);
