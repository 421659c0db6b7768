use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex};

use ftl_types::{BioResult, BlockRef, GcBufRef, Lba, PhysicalAddr, Sector, WCtx};

use crate::entry::Entry;
use crate::guard::{DrainGuard, SyncGuard};

pub(crate) struct ReadState {
    pub subm: u64,
}

struct SyncPoint {
    pos: u64,
    tx: Option<Sender<BioResult>>,
}

pub(crate) struct SyncState {
    pub sync: u64,
    sync_point: Option<SyncPoint>,
}

/// The write cache (§3, §4.1). `capacity` must be a power of two so
/// `pos & mask` maps a monotonic sequence number to a slot index, the same
/// trick the teacher's `lithos-icc::ring` uses for its broadcast ring.
pub struct RingBuffer {
    capacity: u64,
    mask: u64,
    entries: Box<[Mutex<Entry>]>,
    mem: Mutex<u64>,
    read: Mutex<ReadState>,
    sync: Mutex<SyncState>,
    sync_cv: Condvar,
}

impl RingBuffer {
    /// `capacity` must be a power of two (enforced, not just documented —
    /// getting this wrong would silently corrupt the `pos & mask` index
    /// math for every caller).
    pub fn new(capacity: u64) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be a power of two");
        let entries = (0..capacity).map(|_| Mutex::new(Entry::empty())).collect();
        RingBuffer {
            capacity,
            mask: capacity - 1,
            entries,
            mem: Mutex::new(0),
            read: Mutex::new(ReadState { subm: 0 }),
            sync: Mutex::new(SyncState {
                sync: 0,
                sync_point: None,
            }),
            sync_cv: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn idx(&self, pos: u64) -> usize {
        (pos & self.mask) as usize
    }

    /// Reserves `nr_commit` slots starting at the current `mem`, failing if
    /// fewer than `nr_req` are free (§4.1). The asymmetry between the two
    /// counts lets a caller probe before it has finished building a batch.
    pub fn may_write(&self, nr_req: u64, nr_commit: u64) -> Option<u64> {
        let mut mem = self.mem.lock().unwrap();
        let sync = self.sync.lock().unwrap().sync;
        let used = mem.wrapping_sub(sync);
        if self.capacity.saturating_sub(used) < nr_req {
            return None;
        }
        let pos = *mem;
        *mem += nr_commit;
        Some(pos)
    }

    /// Writes sector data and its context into the slot reserved at `pos`.
    /// Only the producer that reserved `pos` via `may_write` may call this.
    pub fn write_entry(&self, pos: u64, data: Sector, w_ctx: WCtx) {
        let mut e = self.entries[self.idx(pos)].lock().unwrap();
        e.data = data;
        e.w_ctx = Some(w_ctx);
    }

    /// Takes the read lock; only one drainer may hold this at a time (§4.1).
    pub fn read_lock(&self) -> DrainGuard<'_> {
        let guard = self.read.lock().unwrap();
        let mem = *self.mem.lock().unwrap();
        DrainGuard {
            ring: self,
            guard,
            mem,
        }
    }

    /// Takes the sync lock, serializing completion-ordered commits (§4.1, §4.5).
    pub fn sync_init(&self) -> SyncGuard<'_> {
        SyncGuard {
            guard: self.sync.lock().unwrap(),
        }
    }

    /// Installs a sync point at `pos` (§4.1). Only one sync point may be
    /// outstanding at a time (§3: "an optional position tag", singular);
    /// a second bare PREFLUSH while one is pending blocks here until the
    /// first one clears, rather than silently failing to return correct
    /// eventual durability — see DESIGN.md.
    pub fn sync_point_set(&self, pos: u64, tx: Option<Sender<BioResult>>) -> bool {
        let mut st = self.sync.lock().unwrap();
        while st.sync_point.is_some() {
            st = self.sync_cv.wait(st).unwrap();
        }
        st.sync_point = Some(SyncPoint { pos, tx });
        true
    }

    /// Sectors still outstanding before the current sync point would be
    /// reached, given the drainer's current `subm` (§4.4 step 1/2). Zero if
    /// no sync point is installed.
    pub fn sync_point_count(&self, subm: u64) -> u64 {
        let st = self.sync.lock().unwrap();
        st.sync_point
            .as_ref()
            .map(|sp| sp.pos.saturating_sub(subm))
            .unwrap_or(0)
    }

    /// Informs the ring that the current drain batch already covers the
    /// sync point at `pos` (§4.4 step 5). This only clears the drainer's
    /// own bookkeeping race — `sync_point_count` naturally returns 0 once
    /// `subm` passes `pos` regardless of this call. The sync point itself,
    /// and the flush bio it carries, are only released once `sync` (not
    /// `subm`) reaches `pos`: firing the bio here would complete a
    /// PREFLUSH before its data is durable.
    pub fn sync_point_reset(&self, pos: u64) {
        let st = self.sync.lock().unwrap();
        debug_assert!(
            st.sync_point.as_ref().map(|sp| sp.pos) != Some(pos) || pos >= st.sync,
            "sync point reset before sync caught up"
        );
    }

    /// Called by the completion path after advancing `sync` to
    /// `current_sync`. If the outstanding sync point's position has been
    /// reached, clears it and returns its bio completion sender so the
    /// caller can fire it.
    pub fn take_reached_sync_point(&self, current_sync: u64) -> Option<Sender<BioResult>> {
        let mut st = self.sync.lock().unwrap();
        let reached = st
            .sync_point
            .as_ref()
            .is_some_and(|sp| sp.pos <= current_sync);
        if !reached {
            return None;
        }
        let sp = st.sync_point.take().unwrap();
        drop(st);
        self.sync_cv.notify_all();
        sp.tx
    }

    /// Scans the ring for the slot currently mapped to physical address
    /// `ppa`. Used only by the rare write-failure recovery path (§4.5),
    /// where a linear scan over the (bounded, power-of-two) ring is cheap
    /// relative to the device retry it precedes.
    pub fn sync_scan_entry(&self, ppa: PhysicalAddr) -> Option<u64> {
        for pos in 0..self.capacity {
            let e = self.entries[pos as usize].lock().unwrap();
            if let Some(w_ctx) = &e.w_ctx {
                if w_ctx.paddr == Some(ppa) {
                    return Some(pos);
                }
            }
        }
        None
    }

    pub fn entry_lba(&self, pos: u64) -> Lba {
        self.entries[self.idx(pos)]
            .lock()
            .unwrap()
            .w_ctx
            .as_ref()
            .map(|w| w.lba)
            .unwrap_or(ftl_types::ADDR_EMPTY)
    }

    /// Stamps the destination physical address and owning block into the
    /// slot's context. Called by the mapper's `map_rr_page` once a block
    /// has allocated the sector (§4.4).
    pub fn stamp_paddr(&self, pos: u64, paddr: PhysicalAddr, owning: BlockRef) {
        let mut e = self.entries[self.idx(pos)].lock().unwrap();
        if let Some(w_ctx) = e.w_ctx.as_mut() {
            w_ctx.paddr = Some(paddr);
            w_ctx.owning_block = Some(owning);
        }
    }

    pub fn entry_paddr(&self, pos: u64) -> Option<PhysicalAddr> {
        self.entries[self.idx(pos)].lock().unwrap().w_ctx.as_ref().and_then(|w| w.paddr)
    }

    pub fn entry_owning_block(&self, pos: u64) -> Option<BlockRef> {
        self.entries[self.idx(pos)]
            .lock()
            .unwrap()
            .w_ctx
            .as_ref()
            .and_then(|w| w.owning_block)
    }

    pub fn entry_gc_ref(&self, pos: u64) -> Option<GcBufRef> {
        self.entries[self.idx(pos)]
            .lock()
            .unwrap()
            .w_ctx
            .as_ref()
            .and_then(|w| w.gc_ref.clone())
    }

    pub fn sector_data(&self, pos: u64) -> Sector {
        self.entries[self.idx(pos)].lock().unwrap().data
    }

    /// Copies a cached sector directly into a caller-owned buffer (§4.2
    /// step 3: "copy cache hits directly from the ring buffer").
    pub fn copy_to_bio(&self, pos: u64, out: &mut Sector) {
        let e = self.entries[self.idx(pos)].lock().unwrap();
        out.copy_from_slice(&e.data);
    }

    pub fn take_bio_completion(&self, pos: u64) -> Option<Sender<BioResult>> {
        self.entries[self.idx(pos)]
            .lock()
            .unwrap()
            .w_ctx
            .as_mut()
            .and_then(|w| w.bio_completion.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::BioFlags;

    fn sector(byte: u8) -> Sector {
        [byte; ftl_types::SECTOR_SIZE]
    }

    #[test]
    fn may_write_reserves_and_respects_capacity() {
        let rb = RingBuffer::new(4);
        assert_eq!(rb.may_write(4, 4), Some(0));
        // Ring is full: sync hasn't advanced, so no more room.
        assert_eq!(rb.may_write(1, 1), None);
    }

    #[test]
    fn write_then_read_commit_then_sync_advance() {
        let rb = RingBuffer::new(8);
        let pos = rb.may_write(2, 2).unwrap();
        rb.write_entry(pos, sector(b'A'), WCtx::new(0, BioFlags::default()));
        rb.write_entry(pos + 1, sector(b'B'), WCtx::new(1, BioFlags::default()));

        let mut drain = rb.read_lock();
        assert_eq!(drain.secs_avail(), 2);
        let start = drain.read_commit(2);
        assert_eq!(start, 0);
        drop(drain);

        let mut sg = rb.sync_init();
        assert_eq!(sg.sync(), 0);
        assert_eq!(sg.sync_advance(2), 2);
    }

    #[test]
    fn sync_point_fires_only_once_sync_reaches_it() {
        let rb = RingBuffer::new(8);
        rb.may_write(1, 1).unwrap();
        assert!(rb.sync_point_set(1, None));
        assert_eq!(rb.sync_point_count(0), 1);
        // sync hasn't reached the point yet: nothing to take.
        assert!(rb.take_reached_sync_point(0).is_none());
        assert_eq!(rb.sync_point_count(0), 1, "premature take must not clear the point");

        let mut sg = rb.sync_init();
        sg.sync_advance(1);
        drop(sg);

        // sync == 1 now reaches the point; taking it clears bookkeeping.
        rb.take_reached_sync_point(1);
        assert_eq!(rb.sync_point_count(1), 0);
    }

    #[test]
    fn copy_to_bio_returns_cached_bytes() {
        let rb = RingBuffer::new(4);
        let pos = rb.may_write(1, 1).unwrap();
        rb.write_entry(pos, sector(b'Z'), WCtx::new(5, BioFlags::default()));
        let mut out = sector(0);
        rb.copy_to_bio(pos, &mut out);
        assert_eq!(out, sector(b'Z'));
    }
}
