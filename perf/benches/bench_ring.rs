use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ftl_perf_bench::ring_with_capacity;
use ftl_types::{BioFlags, SECTOR_SIZE, WCtx};

const CAPACITY: u64 = 1 << 16;

fn bench_reserve_and_write(c: &mut Criterion) {
    let ring = ring_with_capacity(CAPACITY);
    let data = [0xABu8; SECTOR_SIZE];

    c.bench_function("ring_reserve_and_write_entry", |b| {
        b.iter(|| {
            let pos = ring.may_write(1, 1).expect("ring never fills: drained below");
            ring.write_entry(pos, data, WCtx::new(black_box(pos), BioFlags::default()));
            // Immediately commit and sync so `may_write` never runs dry
            // across iterations.
            {
                let mut drain = ring.read_lock();
                drain.read_commit(1);
            }
            let mut sg = ring.sync_init();
            sg.sync_advance(1);
        });
    });
}

fn bench_drain_batch(c: &mut Criterion) {
    let ring = ring_with_capacity(CAPACITY);
    let data = [0xCDu8; SECTOR_SIZE];

    c.bench_function("ring_drain_batch_64", |b| {
        b.iter(|| {
            for _ in 0..64u64 {
                let pos = ring.may_write(1, 1).unwrap();
                ring.write_entry(pos, data, WCtx::new(pos, BioFlags::default()));
            }
            let start = {
                let mut drain = ring.read_lock();
                drain.read_commit(64)
            };
            black_box(start);
            let mut sg = ring.sync_init();
            sg.sync_advance(64);
        });
    });
}

criterion_group!(benches, bench_reserve_and_write, bench_drain_batch);
criterion_main!(benches);
