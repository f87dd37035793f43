use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use epoch_slab::{AdvanceOn, EpochDomain, SlabAllocator};
use std::hint::black_box;

const BUMP_BATCH: usize = 1024;

/// Benchmark: bump allocation off the current chunk (no reuse possible).
fn bench_bump_alloc(c: &mut Criterion) {
    let mut group = c.benchmark_group("bump_alloc");
    group.throughput(Throughput::Elements(BUMP_BATCH as u64));

    for obj_size in [32usize, 64, 256].iter() {
        group.bench_with_input(
            BenchmarkId::new("obj_size", obj_size),
            obj_size,
            |b, &obj_size| {
                let domain = EpochDomain::new();
                b.iter_batched_ref(
                    || {
                        SlabAllocator::builder()
                            .obj_size(obj_size)
                            .chunk_size(1024 * 1024)
                            .advance_on(AdvanceOn::Never)
                            .build(&domain)
                    },
                    |alloc| {
                        for _ in 0..BUMP_BATCH {
                            black_box(alloc.alloc(obj_size));
                        }
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark: alloc/free cycles through the full pipeline at varying
/// free-set sizes. With a single registered thread every seal collects,
/// so the steady state exercises seal, snapshot, collection and reuse.
fn bench_alloc_free_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free_cycle");

    for fs_size in [64usize, 507, 1024].iter() {
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
                b.iter(|| {
                    let obj = alloc.alloc(64);
                    unsafe { alloc.free(black_box(obj)) };
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: epoch advance through the cached slot.
fn bench_advance_epoch(c: &mut Criterion) {
    c.bench_function("advance_epoch", |b| {
        let domain = EpochDomain::new();
        let alloc = SlabAllocator::builder()
            .obj_size(64)
            .chunk_size(4096)
            .build(&domain);
        b.iter(|| alloc.advance_epoch());
    });
}

criterion_group!(
    benches,
    bench_bump_alloc,
    bench_alloc_free_cycle,
    bench_advance_epoch
);
criterion_main!(benches);
