use std::sync::mpsc;

use ftl_media::{IoOp, IoRequest};
use ftl_perf::PerfStage;
use ftl_types::{Bio, FtlError, SECTOR_SIZE, Sector, SectorMeta};
use tracing::warn;

use crate::context::Ftl;
use crate::perf::timed;

impl Ftl {
    /// The host read entry point (§4.2). Blends ring cache hits with
    /// device reads for the holes, preserving the read-in-flight
    /// protocol that makes a concurrent overwrite of the same LBA yield
    /// instead of clobbering the slot this read is copying from.
    ///
    /// The read-in-flight bit only keeps a *new write to this LBA* from
    /// reusing the cached slot out from under us — it says nothing about
    /// the ring slot *index* being recycled by an unrelated LBA once the
    /// sync cursor has passed it. So after copying, the LBA's slot is
    /// re-checked against what the ring entry actually holds now; a
    /// mismatch means our copy raced a drain+reuse of that slot, and the
    /// read retries against the LBA's current mapping instead of handing
    /// back torn or stale bytes.
    pub fn submit_read(&self, mut bio: Bio) {
        let k = bio.nr_secs as u64;
        let mut out = vec![[0u8; SECTOR_SIZE]; k as usize];

        let mut cached_lbas = Vec::new();
        let mut hole_idx = Vec::new();
        let mut hole_ppas = Vec::new();

        timed(PerfStage::ReadCacheHit, || {
            for i in 0..k {
                let lba = bio.lba + i;
                loop {
                    let ppa = self.l2p.snapshot_for_read(lba);
                    if let Some(slot) = ppa.cached_slot() {
                        self.ring.copy_to_bio(slot as u64, &mut out[i as usize]);
                        if self.ring.entry_lba(slot as u64) == lba {
                            cached_lbas.push(lba);
                            break;
                        }
                        // The slot was recycled for a different LBA between
                        // the snapshot and the copy; this mark is now stale.
                        self.l2p.clear_read_inflight(lba);
                        std::thread::yield_now();
                        continue;
                    } else if let Some(paddr) = ppa_persisted(ppa) {
                        hole_idx.push(i as usize);
                        hole_ppas.push(paddr);
                        break;
                    } else {
                        // Unmapped: leave the slot zeroed — "done, zero-fill".
                        break;
                    }
                }
            }
        });

        let result = if hole_ppas.is_empty() {
            Ok(())
        } else {
            timed(PerfStage::ReadDeviceFill, || self.fill_holes(&hole_idx, &hole_ppas, &mut out))
        };

        for lba in cached_lbas {
            self.l2p.clear_read_inflight(lba);
        }

        bio.complete(result.map(|()| Some(out)));
    }

    fn fill_holes(
        &self,
        hole_idx: &[usize],
        hole_ppas: &[ftl_types::PhysicalAddr],
        out: &mut [Sector],
    ) -> Result<(), FtlError> {
        let (tx, rx) = mpsc::channel();
        let rq = IoRequest {
            op: IoOp::Read,
            ppas: hole_ppas.to_vec(),
            data: vec![[0u8; SECTOR_SIZE]; hole_ppas.len()],
            meta: vec![SectorMeta::EMPTY; hole_ppas.len()],
            completion: tx,
        };
        self.media.submit_io(rq)?;
        let completion = rx.recv().map_err(|_| FtlError::Err("device read never completed".into()))?;

        for (slot, &idx) in hole_idx.iter().enumerate() {
            if completion.statuses[slot] != ftl_media::SectorStatus::Ok {
                warn!(idx, "unrecoverable read failure");
                return Err(FtlError::Err("device read failed".into()));
            }
            out[idx] = completion.data[slot];
        }
        Ok(())
    }
}

fn ppa_persisted(ppa: ftl_types::Ppa) -> Option<ftl_types::PhysicalAddr> {
    match ppa {
        ftl_types::Ppa::Persisted(p) => Some(p),
        _ => None,
    }
}
