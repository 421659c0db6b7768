//! Shared statistics and fixture helpers for the `perf` crate's Criterion
//! benches over the data path's hot loops (ring reservation, L2P lookup,
//! `map_rr_page`). Grounded on the teacher's `perf/src/lib.rs` measurement
//! methodology (`compute_stats`/`measure_batched`), stripped of the
//! obsidian/onyx-specific hardware-info probing this domain has no use for.

use std::sync::Arc;

use ftl_l2p::SectorInvalidator;
use ftl_mapper::Mapper;
use ftl_ring::RingBuffer;
use ftl_types::{BlockRef, Geometry, PhysicalAddr};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: u64,
    pub stddev: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub count: usize,
}

pub fn compute_stats(samples: &mut [u64]) -> Stats {
    assert!(!samples.is_empty(), "cannot compute stats on empty samples");
    samples.sort_unstable();

    let count = samples.len();
    let sum: u64 = samples.iter().sum();
    let mean = sum as f64 / count as f64;
    let variance = samples
        .iter()
        .map(|&x| {
            let diff = x as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / count as f64;

    Stats {
        min: samples[0],
        max: samples[count - 1],
        mean,
        median: percentile_sorted(samples, 50.0),
        stddev: variance.sqrt(),
        p50: percentile_sorted(samples, 50.0),
        p90: percentile_sorted(samples, 90.0),
        p99: percentile_sorted(samples, 99.0),
        count,
    }
}

fn percentile_sorted(sorted: &[u64], pct: f64) -> u64 {
    let len = sorted.len();
    if len == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0 * len as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(len - 1);
    sorted[idx]
}

/// The geometry every bench in this crate shares: one LUN, small enough
/// blocks that a bench run exercises block-close and pool-replacement
/// repeatedly rather than draining into a single block forever.
pub fn bench_geometry() -> Geometry {
    Geometry {
        nr_channels: 1,
        nr_luns: 4,
        planes_per_lun: 1,
        blocks_per_lun: 64,
        pages_per_blk: 256,
        sec_per_pg: 4,
        sec_size: ftl_types::SECTOR_SIZE as u32,
        min_write_pgs: 4,
        max_write_pgs: 64,
    }
}

/// A `Mapper` with every LUN's pool pre-filled to `depth` ready blocks, so
/// a bench's allocation calls hit the pool fast path rather than the
/// empty-pool `Requeue` branch.
pub fn mapper_with_full_pools(geometry: Geometry, depth: u32) -> Arc<Mapper> {
    let mapper = Arc::new(Mapper::new(geometry));
    for lun in 0..geometry.nr_luns {
        for block in 0..depth.min(geometry.blocks_per_lun) {
            mapper.lun(lun).push_ready_block(block);
        }
    }
    mapper
}

pub fn ring_with_capacity(capacity: u64) -> Arc<RingBuffer> {
    Arc::new(RingBuffer::new(capacity))
}

/// A discard-the-notification invalidator, for benches that only care
/// about `L2pMap`'s own lock/update cost, not the mapper's reaction.
pub struct NoopInvalidator;

impl SectorInvalidator for NoopInvalidator {
    fn mark_invalid(&self, _owner: BlockRef, _ppa: PhysicalAddr) {}
}
