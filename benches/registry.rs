use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use gatekeep::identity::{CredentialVerifier, Identity, OutboundRx, SessionRegistry};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;

fn ident(i: usize) -> Identity {
    Identity::new(format!("u{i}"), format!("u{i}@bench.io"), format!("User {i}"), ["user"])
}

fn bench_registry(c: &mut Criterion) {
    let ns = [100usize, 1_000usize];
    let mut group = c.benchmark_group("session_registry");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        group.throughput(Throughput::Elements(n as u64));

        // Distinct identities: every register publishes a snapshot to all live connections
        group.bench_with_input(BenchmarkId::new("register_distinct", n), &n, |b, &n| {
            b.iter(|| {
                let reg = SessionRegistry::new();
                let mut rxs: Vec<OutboundRx> = Vec::with_capacity(n);
                for i in 0..n {
                    let (tx, rx) = mpsc::unbounded_channel();
                    rxs.push(rx);
                    let _ = reg.register(&format!("c{i}"), ident(i), tx);
                }
                criterion::black_box(reg.len());
            });
        });

        // Random logins over a small identity pool: mostly evictions
        group.bench_with_input(BenchmarkId::new("register_evict", n), &n, |b, &n| {
            let mut rng = StdRng::seed_from_u64(0xBEEF_CAFE);
            let picks: Vec<usize> = (0..n).map(|_| rng.gen_range(0..16)).collect();
            b.iter(|| {
                let reg = SessionRegistry::new();
                let mut rxs: Vec<OutboundRx> = Vec::with_capacity(n);
                for (i, &who) in picks.iter().enumerate() {
                    let (tx, rx) = mpsc::unbounded_channel();
                    rxs.push(rx);
                    let _ = reg.register(&format!("c{i}"), ident(who), tx);
                }
                criterion::black_box(reg.snapshot());
            });
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let verifier = CredentialVerifier::new("bench-secret", Duration::from_secs(3600), 0).expect("verifier");
    let token = verifier.issue("u1").expect("token");
    let mut group = c.benchmark_group("credential");
    group.bench_function("verify_hs256", |b| {
        b.iter(|| criterion::black_box(verifier.verify(&token).is_ok()));
    });
    group.bench_function("issue_hs256", |b| {
        b.iter(|| criterion::black_box(verifier.issue("u1").map(|t| t.len()).unwrap_or(0)));
    });
    group.finish();
}

criterion_group!(benches, bench_registry, bench_verify);
criterion_main!(benches);
