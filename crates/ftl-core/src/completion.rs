use std::sync::mpsc;

use ftl_completion::RecoveryReissue;
use ftl_media::{IoOp, IoRequest, SectorStatus};
use ftl_perf::PerfStage;
use ftl_types::{BlockRef, FtlError, Lba, PhysicalAddr, SectorMeta};

use crate::context::Ftl;
use crate::perf::timed;

/// Write-failure recovery (§4.5, §7): a sector whose block just went bad
/// is re-mapped to a fresh location and rewritten synchronously, blocking
/// the completion thread that's already handling this request. The
/// sector's bytes are still sitting in the ring at `pos` — `buffer_write`
/// never releases a cached slot until its completion fires — so there's
/// nothing to restore before resubmitting.
impl RecoveryReissue for Ftl {
    fn reissue(&self, lba: Lba, pos: u64) -> Result<(BlockRef, PhysicalAddr), FtlError> {
        timed(PerfStage::RecoveryReissue, || self.reissue_inner(lba, pos))
    }
}

impl Ftl {
    fn reissue_inner(&self, lba: Lba, pos: u64) -> Result<(BlockRef, PhysicalAddr), FtlError> {
        let emergency = self.mapper.any_emergency_gc();
        let outcome = loop {
            match self.mapper.map_rr_page(1, emergency) {
                Ok(outcome) => break outcome,
                Err(_requeue) => {
                    self.provisioner.wake();
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
            }
        };
        let owner = BlockRef { lun: outcome.lun, slot: outcome.block };
        let ppa = self.mapper.physical_addr(outcome.lun, outcome.block, outcome.first_sec);

        {
            let mut blk = self.mapper.block(owner).lock().unwrap();
            blk.stamp_lba(outcome.first_sec, lba);
        }
        self.ring.stamp_paddr(pos, ppa, owner);
        let data = self.ring.sector_data(pos);

        let (tx, rx) = mpsc::channel();
        let rq = IoRequest {
            op: IoOp::Write,
            ppas: vec![ppa],
            data: vec![data],
            meta: vec![SectorMeta { lba }],
            completion: tx,
        };
        self.media.submit_io(rq)?;
        let completion = rx.recv().map_err(|_| FtlError::Err("recovery write never completed".into()))?;
        if completion.statuses.first() != Some(&SectorStatus::Ok) {
            return Err(FtlError::Err(format!("recovery write failed again for lba {lba}")));
        }
        Ok((owner, ppa))
    }
}
