//! Read-side hot-path and grace-period benchmarks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use asymrcu_core::RcuDomain;

fn bench_read_side(c: &mut Criterion) {
    let domain = RcuDomain::new().expect("host must support the heavy fence");
    let registration = domain.register_reader();
    let mut group = c.benchmark_group("read_side");

    group.bench_function("enter_exit", |b| {
        b.iter(|| {
            let guard = registration.read_lock();
            black_box(&guard);
        });
    });

    group.bench_function("enter_exit_nested_x4", |b| {
        b.iter(|| {
            let g1 = registration.read_lock();
            let g2 = registration.read_lock();
            let g3 = registration.read_lock();
            let g4 = registration.read_lock();
            black_box((&g1, &g2, &g3, &g4));
        });
    });

    group.finish();
}

fn bench_synchronize_no_readers(c: &mut Criterion) {
    let domain = RcuDomain::new().expect("host must support the heavy fence");
    c.bench_function("synchronize/no_readers", |b| {
        b.iter(|| domain.synchronize());
    });
}

fn bench_synchronize_idle_readers(c: &mut Criterion) {
    let domain = RcuDomain::new().expect("host must support the heavy fence");
    let stop = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                // Registered but never inside a critical section: the
                // initiator claims every reader during its scan.
                let _registration = domain.register_reader();
                while !stop.load(Ordering::Relaxed) {
                    std::thread::park_timeout(Duration::from_millis(1));
                }
            });
        }
        // Let the idle readers come online before measuring.
        std::thread::sleep(Duration::from_millis(20));

        c.bench_function("synchronize/idle_readers_x8", |b| {
            b.iter(|| domain.synchronize());
        });

        stop.store(true, Ordering::Relaxed);
    });
}

criterion_group!(
    benches,
    bench_read_side,
    bench_synchronize_no_readers,
    bench_synchronize_idle_readers
);
criterion_main!(benches);
