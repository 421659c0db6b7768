use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};

use ftl_l2p::SectorInvalidator;
use ftl_types::{BlockRef, FtlError, Geometry, PhysicalAddr};
use tracing::{debug, warn};

use crate::block::Block;
use crate::lun::LunState;

/// A `min_write_pgs`-sized (or smaller, at the tail) group of sectors
/// allocated on one block by `map_rr_page` (§4.4 step 4).
pub struct MapOutcome {
    pub lun: u16,
    pub block: u32,
    pub first_sec: u32,
    pub count: u32,
}

/// The allocator: round-robins writes across LUNs at page granularity and
/// retires full blocks (§4.4). Owns the block arena — one `Mutex<Block>`
/// per physical block number per LUN (§9: "arena index (block-table
/// slot)"; here the slot *is* the block number, since `blocks_per_lun` is
/// fixed for the device's lifetime).
pub struct Mapper {
    geometry: Geometry,
    luns: Vec<LunState>,
    blocks: Vec<Box<[Mutex<Block>]>>,
    rr_next: AtomicU16,
}

impl Mapper {
    pub fn new(geometry: Geometry) -> Self {
        let nr_dsecs = geometry.nr_blk_dsecs();
        let luns = (0..geometry.nr_luns).map(|_| LunState::new()).collect();
        let blocks = (0..geometry.nr_luns)
            .map(|lun| {
                (0..geometry.blocks_per_lun)
                    .map(|block| Mutex::new(Block::new(lun, block, nr_dsecs)))
                    .collect()
            })
            .collect();
        Mapper { geometry, luns, blocks, rr_next: AtomicU16::new(0) }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn lun(&self, lun: u16) -> &LunState {
        &self.luns[lun as usize]
    }

    pub fn block(&self, r: BlockRef) -> &Mutex<Block> {
        &self.blocks[r.lun as usize][r.slot as usize]
    }

    pub fn is_emergency_gc(&self, lun: u16) -> bool {
        self.luns[lun as usize].is_emergency_gc()
    }

    /// True if any LUN is in emergency GC (§4.3 step 2: "If any LUN is in
    /// emergency-GC mode and the caller is not GC, return REQUEUE").
    pub fn any_emergency_gc(&self) -> bool {
        self.luns.iter().any(|l| l.is_emergency_gc())
    }

    pub fn nr_luns(&self) -> u16 {
        self.luns.len() as u16
    }

    /// §4.4 step 4: plain round robin, or — under emergency GC — the LUN
    /// with the deepest ready-block pool, since that's the one furthest
    /// from starving.
    pub fn next_lun(&self, emergency: bool) -> u16 {
        let nr_luns = self.luns.len() as u16;
        if emergency {
            return (0..nr_luns).max_by_key(|&l| self.luns[l as usize].pool_len()).unwrap_or(0);
        }
        self.rr_next.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some((n + 1) % nr_luns)).unwrap()
    }

    /// Swaps a LUN's current block for a fresh one from its ready pool
    /// (`replace_blk`, §4.4 step 4). Acquires `lists` before `current`,
    /// matching the §5 lock order.
    fn replace_blk(&self, lun: u16) -> Result<u32, FtlError> {
        let state = self.lun(lun);
        let ready = state.take_ready_block().ok_or(FtlError::Requeue)?;
        {
            let mut blk = self.block(BlockRef { lun, slot: ready }).lock().unwrap();
            blk.reinit();
        }
        let mut current = state.current.lock().unwrap();
        *current = Some(ready);
        debug!(lun, block = ready, "opened replacement block");
        Ok(ready)
    }

    /// §4.4 step 4: allocate `count` consecutive sectors from `lun`'s
    /// current open block, replacing it from the pool when full or bad.
    pub fn map_on_lun(&self, lun: u16, count: u32) -> Result<MapOutcome, FtlError> {
        loop {
            let block_num = {
                let current = self.lun(lun).current.lock().unwrap();
                *current
            };
            let block_num = match block_num {
                Some(b) => b,
                None => self.replace_blk(lun)?,
            };

            let mut blk = self.block(BlockRef { lun, slot: block_num }).lock().unwrap();
            match blk.alloc_secs(count) {
                Some(first) => {
                    let became_full = blk.cur_sec() == self.geometry.nr_blk_dsecs();
                    drop(blk);
                    if became_full {
                        *self.lun(lun).current.lock().unwrap() = None;
                    }
                    return Ok(MapOutcome { lun, block: block_num, first_sec: first, count });
                }
                None => {
                    drop(blk);
                    *self.lun(lun).current.lock().unwrap() = None;
                }
            }
        }
    }

    pub fn map_rr_page(&self, count: u32, emergency: bool) -> Result<MapOutcome, FtlError> {
        let lun = self.next_lun(emergency);
        self.map_on_lun(lun, count)
    }

    /// Translates a sector allocated within a block into the device's
    /// packed physical address (§3).
    pub fn physical_addr(&self, lun: u16, block: u32, sec: u32) -> PhysicalAddr {
        let page = sec / self.geometry.sec_per_pg as u32;
        let sector = (sec % self.geometry.sec_per_pg as u32) as u16;
        PhysicalAddr { ch: 0, lun, plane: 0, block, page, sector }
    }

    pub fn sector_index(&self, ppa: PhysicalAddr) -> u32 {
        ppa.page * self.geometry.sec_per_pg as u32 + ppa.sector as u32
    }
}

/// Wires `ftl-l2p`'s mapping-update callback into the mapper's block
/// bitmaps (§4.2: "mark its sector invalid on the owning block").
impl SectorInvalidator for Mapper {
    fn mark_invalid(&self, owner: BlockRef, ppa: PhysicalAddr) {
        let sec = self.sector_index(ppa);
        let mut blk = self.block(owner).lock().unwrap();
        blk.mark_invalid(sec);
    }
}
