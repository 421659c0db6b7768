use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use ftl_media::{IoOp, IoRequest};
use ftl_types::{ADDR_EMPTY, BlockRef, SECTOR_SIZE, SectorMeta};

use crate::context::Ftl;

impl Ftl {
    /// Graceful shutdown (§4.7): drains the ring to empty, then pads each
    /// LUN's currently open block up to `nr_blk_dsecs` so its recovery
    /// page can be written and the block closed. Call before
    /// `shutdown_workers` (or with the workers never spawned, for a
    /// single-threaded synchronous shutdown — it drives the drain loop
    /// itself rather than relying on a background thread).
    pub fn teardown(self: &Arc<Self>) {
        for lun in 0..self.mapper.nr_luns() {
            self.pad_open_block(lun);
        }

        loop {
            let progressed = crate::drain::drain_once(self);
            if !progressed && self.completion.inflight.current() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Pads the remainder of `lun`'s open block, unless it was never
    /// written to — an opened-but-empty block is left alone rather than
    /// padded in full (§4.7: "blocks with zero written sectors are
    /// returned un-padded").
    fn pad_open_block(&self, lun: u16) {
        let Some(block_num) = *self.mapper.lun(lun).current.lock().unwrap() else {
            return;
        };
        let owner = BlockRef { lun, slot: block_num };

        let (cur_sec, remaining) = {
            let blk = self.mapper.block(owner).lock().unwrap();
            (blk.cur_sec(), blk.remaining())
        };
        if cur_sec == 0 || remaining == 0 {
            return;
        }

        let first = {
            let mut blk = self.mapper.block(owner).lock().unwrap();
            blk.alloc_secs(remaining).expect("remaining is exactly what's left in this block")
        };

        let mut ppas = Vec::with_capacity(remaining as usize);
        let mut datas = Vec::with_capacity(remaining as usize);
        let mut metas = Vec::with_capacity(remaining as usize);
        for j in 0..remaining {
            let sec = first + j;
            let ppa = self.mapper.physical_addr(lun, block_num, sec);
            {
                let mut blk = self.mapper.block(owner).lock().unwrap();
                blk.stamp_lba(sec, ADDR_EMPTY);
                blk.mark_invalid(sec);
                blk.mark_synced(sec);
            }
            ppas.push(ppa);
            datas.push([0u8; SECTOR_SIZE]);
            metas.push(SectorMeta::EMPTY);
        }

        let (tx, rx) = mpsc::channel();
        let rq = IoRequest { op: IoOp::Write, ppas, data: datas, meta: metas, completion: tx };
        if self.media.submit_io(rq).is_ok() {
            let _ = rx.recv();
        }
    }
}
