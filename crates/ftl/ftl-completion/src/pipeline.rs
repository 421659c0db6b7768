use std::collections::BTreeMap;
use std::sync::Mutex;

use ftl_mapper::Mapper;
use ftl_ring::RingBuffer;
use ftl_types::{BlockRef, FtlError, Lba, PhysicalAddr};
use tracing::{info, warn};

use crate::admission::InflightGate;

/// Per-sector outcome of one submitted device write (§4.5). `ring_pos` is
/// `None` for synthetic padding sectors (§4.4 step 3), which never
/// occupied a ring slot and so need no ordering — the drain loop applies
/// their block-bitmap effects directly rather than routing them through
/// here.
pub struct SectorOutcome {
    pub ring_pos: Option<u64>,
    pub lba: Lba,
    pub owner: BlockRef,
    pub ppa: PhysicalAddr,
    pub ok: bool,
}

/// Recovery's hand-back to the submission path (§4.5 write-failure):
/// re-submit the sector still cached at `pos` to a freshly mapped
/// location, blocking until the device reports an outcome. Implemented
/// by `ftl-core`, which is the only crate holding the ring, mapper, and
/// media manager together.
pub trait RecoveryReissue: Send + Sync {
    fn reissue(&self, lba: Lba, pos: u64) -> Result<(BlockRef, PhysicalAddr), FtlError>;
}

/// A ring position waiting for `sync` to reach it (§4.5: "insert this
/// completion into the pending queue keyed by `sentry`").
struct Ready {
    lba: Lba,
    owner: BlockRef,
    sector: u32,
}

/// A sector whose `sync` cursor just passed it, returned to the caller so
/// it can publish the persisted mapping in the L2P (§4.2 `update_map`'s
/// counterpart on the completion side — this crate has no L2P dependency,
/// so `ftl-core` does that publish using this handoff). `slot` is the
/// masked ring position the sector was cached under at submission time;
/// `ftl-core` uses it to detect whether the LBA was overwritten again
/// before this completion arrived (scenario 3, §8).
pub struct CommittedSector {
    pub lba: Lba,
    pub slot: u32,
    pub ppa: PhysicalAddr,
    pub owner: BlockRef,
}

/// The write-completion pipeline (§4.5): commits the ring's `sync`
/// cursor strictly in ring order regardless of device completion order,
/// and recovers from per-sector write failures.
pub struct CompletionPipeline {
    ring: std::sync::Arc<RingBuffer>,
    mapper: std::sync::Arc<Mapper>,
    pub inflight: InflightGate,
    pending: Mutex<BTreeMap<u64, Ready>>,
}

impl CompletionPipeline {
    pub fn new(ring: std::sync::Arc<RingBuffer>, mapper: std::sync::Arc<Mapper>, inflight_cap: u64) -> Self {
        CompletionPipeline {
            ring,
            mapper,
            inflight: InflightGate::new(inflight_cap),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Handles one device write request's completion (§4.5). Successful
    /// ring-backed sectors are queued for in-order commit; failed ones go
    /// through `reissue` before being queued under their original
    /// position — from the ring's point of view a recovered sector is
    /// just a completion that arrived late.
    pub fn on_write_complete(
        &self,
        outcomes: Vec<SectorOutcome>,
        reissue: &dyn RecoveryReissue,
    ) -> Vec<CommittedSector> {
        for outcome in outcomes {
            let Some(pos) = outcome.ring_pos else { continue };
            if outcome.ok {
                self.queue_ready(pos, outcome.lba, outcome.owner, self.mapper.sector_index(outcome.ppa));
            } else {
                warn!(lba = outcome.lba, pos, "write failed, recovering sector");
                self.mapper.block(outcome.owner).lock().unwrap().mark_bad();
                match reissue.reissue(outcome.lba, pos) {
                    Ok((new_owner, new_ppa)) => {
                        self.queue_ready(pos, outcome.lba, new_owner, self.mapper.sector_index(new_ppa));
                    }
                    Err(e) => {
                        warn!(lba = outcome.lba, ?e, "recovery reissue failed, sector stays cached");
                    }
                }
            }
        }
        self.drain_ready()
    }

    fn queue_ready(&self, pos: u64, lba: Lba, owner: BlockRef, sector: u32) {
        self.pending.lock().unwrap().insert(pos, Ready { lba, owner, sector });
    }

    /// Walks the pending queue from the current `sync` cursor, committing
    /// every contiguous entry found (§4.5: "walk a pending-completion
    /// queue for any entries now contiguous and drain them in-order").
    /// Returns the sectors that were committed, so `ftl-core` can publish
    /// their persisted mappings in the L2P.
    fn drain_ready(&self) -> Vec<CommittedSector> {
        let mut committed = Vec::new();
        let mut sg = self.ring.sync_init();
        loop {
            let next = sg.sync();
            let ready = self.pending.lock().unwrap().remove(&next);
            let Some(ready) = ready else { break };

            let closed = self.mapper.block(ready.owner).lock().unwrap().mark_synced(ready.sector);
            if closed {
                info!(lun = ready.owner.lun, slot = ready.owner.slot, "block closed");
            }
            if let Some(tx) = self.ring.take_bio_completion(next) {
                let _ = tx.send(Ok(None));
            }
            let ppa = self.mapper.physical_addr(ready.owner.lun, ready.owner.slot, ready.sector);
            committed.push(CommittedSector {
                lba: ready.lba,
                slot: (next % self.ring.capacity()) as u32,
                ppa,
                owner: ready.owner,
            });
            self.inflight.release(1);
            sg.sync_advance(1);
        }
        let sync = sg.sync();
        drop(sg);
        if let Some(tx) = self.ring.take_reached_sync_point(sync) {
            let _ = tx.send(Ok(None));
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::{BioFlags, Geometry, WCtx};

    fn geom() -> Geometry {
        Geometry {
            nr_channels: 1,
            nr_luns: 1,
            planes_per_lun: 1,
            blocks_per_lun: 1,
            pages_per_blk: 5,
            sec_per_pg: 2,
            sec_size: ftl_types::SECTOR_SIZE as u32,
            min_write_pgs: 2,
            max_write_pgs: 16,
        }
    }

    struct NeverReissue;
    impl RecoveryReissue for NeverReissue {
        fn reissue(&self, _lba: Lba, _pos: u64) -> Result<(BlockRef, PhysicalAddr), FtlError> {
            Err(FtlError::Err("no recovery in this test".into()))
        }
    }

    fn ppa(sec: u32) -> PhysicalAddr {
        PhysicalAddr { ch: 0, lun: 0, plane: 0, block: 0, page: sec / 2, sector: (sec % 2) as u16 }
    }

    #[test]
    fn out_of_order_completions_commit_in_ring_order() {
        let ring = std::sync::Arc::new(RingBuffer::new(8));
        let mapper = std::sync::Arc::new(Mapper::new(geom()));
        mapper.lun(0).push_ready_block(0);
        let out = mapper.map_on_lun(0, 2).unwrap();
        assert_eq!(out.first_sec, 0);

        for i in 0..2u64 {
            let pos = ring.may_write(1, 1).unwrap();
            assert_eq!(pos, i);
            ring.write_entry(pos, [0u8; ftl_types::SECTOR_SIZE], WCtx::new(i, BioFlags::default()));
        }

        let pipeline = CompletionPipeline::new(ring.clone(), mapper.clone(), 1000);
        pipeline.inflight.admit(2);
        let owner = BlockRef { lun: 0, slot: 0 };

        // Position 1 completes before position 0.
        pipeline.on_write_complete(
            vec![SectorOutcome { ring_pos: Some(1), lba: 1, owner, ppa: ppa(1), ok: true }],
            &NeverReissue,
        );
        assert_eq!(pipeline.inflight.current(), 2, "out-of-order completion must not advance sync yet");

        pipeline.on_write_complete(
            vec![SectorOutcome { ring_pos: Some(0), lba: 0, owner, ppa: ppa(0), ok: true }],
            &NeverReissue,
        );
        assert_eq!(pipeline.inflight.current(), 0, "both sectors release once sync catches up");
    }
}
