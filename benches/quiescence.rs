use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use epoch_slab::{AdvanceOn, EpochDomain, SlabAllocator};
use std::hint::black_box;

/// Benchmark: snapshot cost against registry size.
///
/// Registry slots persist after their threads exit, so spawning and
/// joining N registration threads leaves an N-entry registry behind for
/// the measurement.
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for threads in [1usize, 4, 16, 64].iter() {
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            threads,
            |b, &threads| {
                let domain = EpochDomain::new();
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let domain = domain.clone();
                        std::thread::spawn(move || {
                            domain.register_thread();
                            domain.advance_epoch();
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
                assert_eq!(domain.threads(), threads);

                b.iter(|| black_box(domain.snapshot()));
            },
        );
    }

    group.finish();
}

/// Benchmark: the seal + reclaim step in isolation.
///
/// Frees exactly one full free set per iteration batch; with a single
/// registered thread every seal proves quiescence, so each batch pays for
/// one snapshot, one collection and one rotation.
fn bench_seal_and_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal_and_reclaim");

    for fs_size in [64usize, 507].iter() {
        group.bench_with_input(
            BenchmarkId::new("free_set_size", fs_size),
            fs_size,
            |b, &fs_size| {
                let domain = EpochDomain::new();
                let mut alloc = SlabAllocator::builder()
                    .obj_size(64)
                    .free_set_size(fs_size)
                    .chunk_size(4 * 1024 * 1024)
                    .advance_on(AdvanceOn::Free)
                    .build(&domain);
                let mut shuttle: Vec<_> = (0..fs_size).map(|_| alloc.alloc(64)).collect();

                b.iter(|| {
                    for obj in shuttle.drain(..) {
                        unsafe { alloc.free(obj) };
                    }
                    for _ in 0..fs_size {
                        shuttle.push(alloc.alloc(64));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_snapshot, bench_seal_and_reclaim);
criterion_main!(benches);
