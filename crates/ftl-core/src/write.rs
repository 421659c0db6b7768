use std::sync::Arc;

use ftl_perf::PerfStage;
use ftl_types::{Bio, BioOp, FtlError, GcBufRef, Lba, Ppa, WCtx, ADDR_EMPTY};

use crate::context::Ftl;
use crate::perf::timed;

impl Ftl {
    /// The host write entry point (§4.3). A bare PREFLUSH (no data)
    /// installs a sync point and returns synchronously; a data-carrying
    /// write buffers into the ring and publishes a cached mapping per
    /// sector before returning.
    pub fn buffer_write(self: &Arc<Self>, mut bio: Bio) -> Result<(), FtlError> {
        if bio.op == BioOp::Flush {
            // Zero-size reservation: `may_write` never fails with
            // `nr_req = 0`, so this only ever reads the current `mem`.
            let pos = self.ring.may_write(0, 0).expect("zero-sector reservation cannot fail");
            self.ring.sync_point_set(pos, bio.completion.take());
            self.drain_signal.kick();
            return Err(FtlError::Done);
        }

        if !bio.flags.gc && self.mapper.any_emergency_gc() {
            return Err(FtlError::Requeue);
        }

        let k = bio.nr_secs as u64;
        let pos = self.ring.may_write(k, k).ok_or(FtlError::Requeue)?;

        timed(PerfStage::RingReserve, || -> Result<(), FtlError> {
            let mut completion = bio.completion.take();
            for i in 0..k {
                let lba = bio.lba + i;
                let slot = pos + i;
                let mut w_ctx = WCtx::new(lba, bio.flags);
                if i + 1 == k {
                    w_ctx.bio_completion = completion.take();
                }
                self.ring.write_entry(slot, bio.data[i as usize], w_ctx);

                let cached = Ppa::Cached { slot: (slot % self.ring.capacity()) as u32, read_inflight: 0 };
                loop {
                    match self.l2p.update_map(lba, cached, None, self.mapper.as_ref()) {
                        Ok(()) => break,
                        Err(FtlError::Busy) => std::thread::yield_now(),
                        Err(e) => return Err(e),
                    }
                }
            }
            Ok(())
        })?;

        self.completion.inflight.admit(k);

        if bio.flags.preflush {
            self.drain_signal.kick();
        }

        Ok(())
    }

    /// The GC write path (§4.3): `lba_list` may be sparse (`ADDR_EMPTY`
    /// entries skipped); every live sector keeps `buf` alive via a shared
    /// reference until it drains, and the call is exempt from the
    /// emergency-GC gate since it's what clears emergency GC in the first
    /// place.
    pub fn write_list_to_cache(self: &Arc<Self>, lba_list: &[Lba], buf: GcBufRef) -> Result<(), FtlError> {
        let live = lba_list.iter().filter(|&&l| l != ADDR_EMPTY).count() as u64;
        if live == 0 {
            return Ok(());
        }
        let pos = self.ring.may_write(live, live).ok_or(FtlError::Requeue)?;

        timed(PerfStage::RingReserve, || -> Result<(), FtlError> {
            let mut slot = pos;
            for (i, &lba) in lba_list.iter().enumerate() {
                if lba == ADDR_EMPTY {
                    continue;
                }
                let mut w_ctx = WCtx::new(lba, ftl_types::BioFlags { preflush: false, gc: true });
                w_ctx.gc_ref = Some(buf.clone());
                self.ring.write_entry(slot, buf[i], w_ctx);

                let cached = Ppa::Cached { slot: (slot % self.ring.capacity()) as u32, read_inflight: 0 };
                loop {
                    match self.l2p.update_map(lba, cached, None, self.mapper.as_ref()) {
                        Ok(()) => break,
                        Err(FtlError::Busy) => std::thread::yield_now(),
                        Err(e) => return Err(e),
                    }
                }
                slot += 1;
            }
            Ok(())
        })?;

        self.completion.inflight.admit(live);
        self.drain_signal.kick();
        Ok(())
    }
}
