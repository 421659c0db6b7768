use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ftl_l2p::L2pMap;
use ftl_perf_bench::NoopInvalidator;
use ftl_types::Ppa;

const NR_SECS: usize = 1 << 20;

fn bench_update_map(c: &mut Criterion) {
    let l2p = L2pMap::new(NR_SECS);
    let invalidator = NoopInvalidator;
    let mut lba = 0u64;

    c.bench_function("l2p_update_map_cached", |b| {
        b.iter(|| {
            let ppa = Ppa::Cached { slot: (lba % 4096) as u32, read_inflight: 0 };
            l2p.update_map(lba % NR_SECS as u64, ppa, None, &invalidator).unwrap();
            lba += 1;
        });
    });
}

fn bench_peek(c: &mut Criterion) {
    let l2p = L2pMap::new(NR_SECS);
    let invalidator = NoopInvalidator;
    for lba in 0..4096u64 {
        l2p.update_map(lba, Ppa::Cached { slot: lba as u32, read_inflight: 0 }, None, &invalidator)
            .unwrap();
    }

    c.bench_function("l2p_peek", |b| {
        let mut lba = 0u64;
        b.iter(|| {
            black_box(l2p.peek(lba % 4096));
            lba += 1;
        });
    });
}

criterion_group!(benches, bench_update_map, bench_peek);
criterion_main!(benches);
