use ftl_types::{ADDR_EMPTY, Lba};

use crate::bitmap::Bitmap;
use crate::recovery::RecoveryPage;

/// Block lifecycle (§3): `FREE -> OPEN -> FULL -> CLOSING -> CLOSED ->
/// (GC) -> RETIRED`, or any state `-> BAD`. `CLOSING` and `GC` are named
/// in the spec but not driven by anything in this data path (GC itself is
/// out of scope, §1) — they're kept as variants so the type faithfully
/// models the source states even though this crate never constructs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Open,
    Full,
    Closing,
    Closed,
    Gc,
    Retired,
    Bad,
}

/// Per-erase-block state (`rblk`, §3). One `Block` exists per physical
/// block number on a LUN, reused across its erase/retire lifetime.
pub struct Block {
    pub lun: u16,
    pub block: u32,
    nr_dsecs: u32,
    cur_sec: u32,
    sector_bitmap: Bitmap,
    sync_bitmap: Bitmap,
    invalid_bitmap: Bitmap,
    lba_rev: Vec<Lba>,
    state: BlockState,
}

impl Block {
    pub fn new(lun: u16, block: u32, nr_dsecs: u32) -> Self {
        Block {
            lun,
            block,
            nr_dsecs,
            cur_sec: 0,
            sector_bitmap: Bitmap::new(nr_dsecs),
            sync_bitmap: Bitmap::new(nr_dsecs),
            invalid_bitmap: Bitmap::new(nr_dsecs),
            lba_rev: vec![ADDR_EMPTY; nr_dsecs as usize],
            state: BlockState::Free,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn cur_sec(&self) -> u32 {
        self.cur_sec
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.cur_sec, self.sector_bitmap.popcount());
        debug_assert!(self.sector_bitmap.popcount() >= self.sync_bitmap.popcount());
        debug_assert!(self.invalid_bitmap.is_subset_of(&self.sector_bitmap));
    }

    /// Bumps `cur_sec` by `n` under the block lock, returning the first
    /// sector index allocated. `None` if the block can't take `n` more
    /// sectors (full or not open for writes) — the caller (mapper's
    /// `map_rr_page`) replaces the block and retries.
    pub fn alloc_secs(&mut self, n: u32) -> Option<u32> {
        if matches!(self.state, BlockState::Bad | BlockState::Retired) {
            return None;
        }
        if self.cur_sec + n > self.nr_dsecs {
            return None;
        }
        let first = self.cur_sec;
        for i in first..first + n {
            self.sector_bitmap.set(i);
        }
        self.cur_sec += n;
        if self.state == BlockState::Free {
            self.state = BlockState::Open;
        }
        if self.cur_sec == self.nr_dsecs {
            self.state = BlockState::Full;
        }
        self.check_invariants();
        Some(first)
    }

    /// Stamps the LBA owning a just-allocated sector, for the reverse map
    /// carried in the `rlpg` (§6). `ADDR_EMPTY` for padding sectors.
    pub fn stamp_lba(&mut self, sec: u32, lba: Lba) {
        self.lba_rev[sec as usize] = lba;
    }

    /// Marks a sector persisted (§4.5 success path). Returns `true` if
    /// this closed the block (`sync_bitmap` now full, §3).
    pub fn mark_synced(&mut self, sec: u32) -> bool {
        self.sync_bitmap.set(sec);
        self.check_invariants();
        if self.sync_bitmap.is_full() {
            self.state = BlockState::Closed;
            true
        } else {
            false
        }
    }

    /// Marks a sector invalid — overwritten by a later write, or padding
    /// (§4.4 step 4, §4.2 `update_map`/`invalidate_range`).
    pub fn mark_invalid(&mut self, sec: u32) {
        self.invalid_bitmap.set(sec);
        self.check_invariants();
    }

    pub fn mark_bad(&mut self) {
        self.state = BlockState::Bad;
    }

    pub fn retire(&mut self) {
        self.state = BlockState::Retired;
    }

    /// Resets a retired/erased block back to `FREE` for reuse by the
    /// provisioner under a (possibly different) physical block number's
    /// slot — the arena slot is recycled, the logical content is not.
    pub fn reinit(&mut self) {
        self.cur_sec = 0;
        self.sector_bitmap.clear_all();
        self.sync_bitmap.clear_all();
        self.invalid_bitmap.clear_all();
        self.lba_rev.iter_mut().for_each(|l| *l = ADDR_EMPTY);
        self.state = BlockState::Free;
    }

    /// Remaining sectors the pad path needs to fill before the block can
    /// close (§4.7 teardown, §4.4 step 3's pad allocation).
    pub fn remaining(&self) -> u32 {
        self.nr_dsecs - self.cur_sec
    }

    pub fn build_recovery_page(&self) -> RecoveryPage {
        RecoveryPage {
            nr_lbas: self.lba_rev.iter().filter(|&&l| l != ADDR_EMPTY).count() as u32,
            nr_padded: self.invalid_bitmap.popcount(),
            lba_array: self.lba_rev.clone(),
            sector_bitmap: bitmap_words(&self.sector_bitmap, self.nr_dsecs),
            sync_bitmap: bitmap_words(&self.sync_bitmap, self.nr_dsecs),
            invalid_bitmap: bitmap_words(&self.invalid_bitmap, self.nr_dsecs),
        }
    }
}

fn bitmap_words(b: &Bitmap, nr_bits: u32) -> Vec<u64> {
    (0..nr_bits.div_ceil(64)).map(|w| {
        (0..64).fold(0u64, |acc, bit| {
            let i = w * 64 + bit;
            if i < nr_bits && b.get(i) { acc | (1u64 << bit) } else { acc }
        })
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_transitions_free_to_open_to_full() {
        let mut blk = Block::new(0, 0, 8);
        assert_eq!(blk.state(), BlockState::Free);
        assert_eq!(blk.alloc_secs(4), Some(0));
        assert_eq!(blk.state(), BlockState::Open);
        assert_eq!(blk.alloc_secs(4), Some(4));
        assert_eq!(blk.state(), BlockState::Full);
        assert_eq!(blk.alloc_secs(1), None, "full block refuses further allocation");
    }

    #[test]
    fn mark_synced_closes_block_once_full() {
        let mut blk = Block::new(0, 0, 2);
        blk.alloc_secs(2).unwrap();
        assert!(!blk.mark_synced(0));
        assert_eq!(blk.state(), BlockState::Full);
        assert!(blk.mark_synced(1));
        assert_eq!(blk.state(), BlockState::Closed);
    }

    #[test]
    fn reinit_restores_free_state() {
        let mut blk = Block::new(0, 0, 4);
        blk.alloc_secs(4).unwrap();
        blk.mark_bad();
        blk.reinit();
        assert_eq!(blk.state(), BlockState::Free);
        assert_eq!(blk.cur_sec(), 0);
        assert_eq!(blk.alloc_secs(4), Some(0));
    }
}
