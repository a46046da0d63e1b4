//! Benchmarks for modular exponentiation and a full exchange at each catalog width.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dhsim::exchange::{catalog, mod_pow, ExchangeSession, KeyGenConfig, KeyGenerator, Party};

fn bench_mod_pow(c: &mut Criterion) {
    let mut group = c.benchmark_group("mod_pow");
    let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(42) });

    for params in catalog() {
        let exponent = keygen.generate(&params.p).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(&params.name), &params, |b, params| {
            b.iter(|| black_box(mod_pow(&params.g, &exponent, &params.p).unwrap()));
        });
    }

    group.finish();
}

fn bench_full_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange");

    for params in catalog() {
        let mut keygen = KeyGenerator::new(&KeyGenConfig { seed: Some(7) });
        let ready = ExchangeSession::new()
            .set_parameters(params.clone())
            .generate_private_key(Party::Alice, &mut keygen)
            .unwrap()
            .into_session()
            .generate_private_key(Party::Bob, &mut keygen)
            .unwrap()
            .into_session();
        group.bench_with_input(BenchmarkId::from_parameter(&params.name), &ready, |b, session| {
            b.iter(|| black_box(session.exchange().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mod_pow, bench_full_exchange);
criterion_main!(benches);
