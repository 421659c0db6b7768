use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ftl_mmap::MmapFileMut;
use ftl_types::{FtlError, Geometry, PhysicalAddr, SECTOR_SIZE, Sector, SectorMeta};
use tracing::{debug, warn};

use crate::contract::{
    BlkMarkState, BlockFlags, BlockHandle, EraseMode, IoCompletion, IoOp, IoRequest, MediaManager,
    SectorStatus,
};

static MOCK_SEQ: AtomicU64 = AtomicU64::new(0);

struct LunStore {
    file: Mutex<MmapFileMut>,
    meta: Mutex<Vec<SectorMeta>>,
    free_blocks: Mutex<VecDeque<u32>>,
    bad_blocks: Mutex<HashSet<u32>>,
}

/// In-memory stand-in for the media manager, backed by one `memmap2` file
/// per LUN (grounded on `ftl-mmap`, the teacher's generic mmap wrapper).
/// Lets the rest of the workspace move real bytes through a
/// write-then-device-read round trip without real hardware.
///
/// Expected to be held behind an `Arc` for the life of the process — device
/// callbacks run on detached threads that borrow its `LunStore`s by raw
/// pointer rather than carrying a lifetime.
pub struct MockMedia {
    geometry: Geometry,
    luns: Vec<LunStore>,
    /// Sectors to fail exactly once, for exercising §4.5 recovery in tests.
    inject_write_fail: Mutex<HashSet<(u16, u32, u32, u16)>>,
}

impl MockMedia {
    pub fn new(geometry: Geometry) -> std::io::Result<Self> {
        assert_eq!(
            geometry.sec_size as usize, SECTOR_SIZE,
            "mock media assumes uniform {SECTOR_SIZE}-byte sectors"
        );
        let secs_per_lun = geometry.blocks_per_lun as usize
            * geometry.pages_per_blk as usize
            * geometry.sec_per_pg as usize;
        let bytes_per_lun = (secs_per_lun * SECTOR_SIZE) as u64;

        let mut luns = Vec::with_capacity(geometry.nr_luns as usize);
        for lun in 0..geometry.nr_luns {
            let seq = MOCK_SEQ.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir()
                .join(format!("ftl-mock-media-{}-{}-{lun}", std::process::id(), seq));
            let file = MmapFileMut::create_rw(&path, bytes_per_lun)?;
            let _ = std::fs::remove_file(&path);
            luns.push(LunStore {
                file: Mutex::new(file),
                meta: Mutex::new(vec![SectorMeta::EMPTY; secs_per_lun]),
                free_blocks: Mutex::new((0..geometry.blocks_per_lun).collect()),
                bad_blocks: Mutex::new(HashSet::new()),
            });
        }

        Ok(MockMedia { geometry, luns, inject_write_fail: Mutex::new(HashSet::new()) })
    }

    /// Arranges for the next write to the given sector to report `Fail`.
    pub fn inject_write_failure(&self, ppa: PhysicalAddr) {
        self.inject_write_fail.lock().unwrap().insert((ppa.lun, ppa.block, ppa.page, ppa.sector));
    }

    fn sector_index(&self, ppa: PhysicalAddr) -> usize {
        (ppa.block as usize * self.geometry.pages_per_blk as usize + ppa.page as usize)
            * self.geometry.sec_per_pg as usize
            + ppa.sector as usize
    }

    fn lun(&self, idx: u16) -> &LunStore {
        &self.luns[idx as usize]
    }

    fn drain_injected(&self, keys: &[(u16, u32, u32, u16)]) -> Vec<bool> {
        let mut guard = self.inject_write_fail.lock().unwrap();
        keys.iter().map(|k| guard.remove(k)).collect()
    }
}

impl MediaManager for MockMedia {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn get_blk(&self, lun: u16, _flags: BlockFlags) -> Option<BlockHandle> {
        let block = self.lun(lun).free_blocks.lock().unwrap().pop_front()?;
        Some(BlockHandle { lun, block })
    }

    fn put_blk(&self, blk: BlockHandle) {
        let store = self.lun(blk.lun);
        if store.bad_blocks.lock().unwrap().contains(&blk.block) {
            return;
        }
        store.free_blocks.lock().unwrap().push_back(blk.block);
    }

    fn free_block_count(&self, lun: u16) -> usize {
        self.lun(lun).free_blocks.lock().unwrap().len()
    }

    fn mark_blk(&self, blk: BlockHandle, state: BlkMarkState) {
        match state {
            BlkMarkState::Bad => {
                warn!(lun = blk.lun, block = blk.block, "marking block bad");
                self.lun(blk.lun).bad_blocks.lock().unwrap().insert(blk.block);
            }
        }
    }

    fn erase_blk(&self, blk: BlockHandle, _mode: EraseMode) -> Result<(), FtlError> {
        let store = self.lun(blk.lun);
        let secs_per_blk = self.geometry.pages_per_blk as usize * self.geometry.sec_per_pg as usize;
        let start = blk.block as usize * secs_per_blk;

        let mut file = store.file.lock().unwrap();
        let byte_off = start * SECTOR_SIZE;
        let byte_len = secs_per_blk * SECTOR_SIZE;
        // SAFETY: start/secs_per_blk stay within the file's mapped length,
        // bounded by blocks_per_lun at construction.
        unsafe {
            std::ptr::write_bytes(file.as_mut_ptr().add(byte_off), 0, byte_len);
        }
        drop(file);

        let mut meta = store.meta.lock().unwrap();
        for m in &mut meta[start..start + secs_per_blk] {
            *m = SectorMeta::EMPTY;
        }
        debug!(lun = blk.lun, block = blk.block, "erased block");
        Ok(())
    }

    fn submit_io(&self, rq: IoRequest) -> Result<(), FtlError> {
        let lun = rq.ppas.first().map(|p| p.lun).unwrap_or(0);
        let indices: Vec<usize> = rq.ppas.iter().map(|p| self.sector_index(p)).collect();
        let fail_keys: Vec<(u16, u32, u32, u16)> =
            rq.ppas.iter().map(|p| (p.lun, p.block, p.page, p.sector)).collect();
        let inject = self.drain_injected(&fail_keys);

        // SAFETY: `store` is borrowed for the life of `self`, which the
        // caller keeps alive (typically behind an `Arc`) for as long as any
        // outstanding `submit_io` callback may still be running.
        let store: *const LunStore = self.lun(lun);
        let store = store as usize;

        std::thread::Builder::new()
            .name("ftl-media-io".into())
            .spawn(move || {
                let store = unsafe { &*(store as *const LunStore) };
                let IoRequest { op, ppas: _, mut data, meta: meta_in, completion } = rq;

                let mut file = store.file.lock().unwrap();
                let mut meta = store.meta.lock().unwrap();
                let mut statuses = Vec::with_capacity(indices.len());
                for (i, &idx) in indices.iter().enumerate() {
                    if inject[i] {
                        statuses.push(SectorStatus::Fail);
                        continue;
                    }
                    let byte_off = idx * SECTOR_SIZE;
                    // SAFETY: idx is derived from geometry-bounded PPAs
                    // targeting this LUN's own mapping.
                    unsafe {
                        let slot = file.as_mut_ptr().add(byte_off);
                        match op {
                            IoOp::Write => {
                                std::ptr::copy_nonoverlapping(data[i].as_ptr(), slot, SECTOR_SIZE);
                            }
                            IoOp::Read => {
                                std::ptr::copy_nonoverlapping(
                                    slot,
                                    data[i].as_mut_ptr(),
                                    SECTOR_SIZE,
                                );
                            }
                        }
                    }
                    if op == IoOp::Write {
                        if let Some(m) = meta_in.get(i) {
                            meta[idx] = *m;
                        }
                    }
                    statuses.push(SectorStatus::Ok);
                }
                drop(meta);
                drop(file);
                let _ = completion.send(IoCompletion { data, statuses });
            })
            .map_err(|e| FtlError::Err(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::SectorMeta;
    use std::sync::mpsc::channel;

    fn geom() -> Geometry {
        Geometry {
            nr_channels: 1,
            nr_luns: 2,
            planes_per_lun: 1,
            blocks_per_lun: 4,
            pages_per_blk: 4,
            sec_per_pg: 2,
            sec_size: SECTOR_SIZE as u32,
            min_write_pgs: 1,
            max_write_pgs: 4,
        }
    }

    #[test]
    fn get_blk_then_erase_then_write_read_round_trip() {
        let media = MockMedia::new(geom()).unwrap();
        let blk = media.get_blk(0, BlockFlags { gc: false }).unwrap();
        media.erase_blk(blk, EraseMode::Normal).unwrap();

        let ppa = PhysicalAddr { ch: 0, lun: 0, plane: 0, block: blk.block, page: 0, sector: 0 };
        let (tx, rx) = channel();
        media
            .submit_io(IoRequest {
                op: IoOp::Write,
                ppas: vec![ppa],
                data: vec![[7u8; SECTOR_SIZE]],
                meta: vec![SectorMeta { lba: 42 }],
                completion: tx,
            })
            .unwrap();
        let done = rx.recv().unwrap();
        assert_eq!(done.statuses, vec![SectorStatus::Ok]);

        let (tx, rx) = channel();
        media
            .submit_io(IoRequest {
                op: IoOp::Read,
                ppas: vec![ppa],
                data: vec![[0u8; SECTOR_SIZE]],
                meta: vec![],
                completion: tx,
            })
            .unwrap();
        let done = rx.recv().unwrap();
        assert_eq!(done.data[0], [7u8; SECTOR_SIZE]);
    }

    #[test]
    fn injected_write_failure_reports_fail_once() {
        let media = MockMedia::new(geom()).unwrap();
        let blk = media.get_blk(1, BlockFlags { gc: false }).unwrap();
        media.erase_blk(blk, EraseMode::Normal).unwrap();
        let ppa = PhysicalAddr { ch: 0, lun: 1, plane: 0, block: blk.block, page: 0, sector: 0 };
        media.inject_write_failure(ppa);

        let (tx, rx) = channel();
        media
            .submit_io(IoRequest {
                op: IoOp::Write,
                ppas: vec![ppa],
                data: vec![[1u8; SECTOR_SIZE]],
                meta: vec![SectorMeta { lba: 1 }],
                completion: tx,
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap().statuses, vec![SectorStatus::Fail]);

        // Second attempt at the same sector succeeds: the injected fault
        // only fires once.
        let (tx, rx) = channel();
        media
            .submit_io(IoRequest {
                op: IoOp::Write,
                ppas: vec![ppa],
                data: vec![[1u8; SECTOR_SIZE]],
                meta: vec![SectorMeta { lba: 1 }],
                completion: tx,
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap().statuses, vec![SectorStatus::Ok]);
    }

    #[test]
    fn bad_block_is_not_returned_to_free_pool() {
        let media = MockMedia::new(geom()).unwrap();
        let blk = media.get_blk(0, BlockFlags { gc: false }).unwrap();
        media.mark_blk(blk, BlkMarkState::Bad);
        media.put_blk(blk);

        let remaining: Vec<_> =
            std::iter::from_fn(|| media.get_blk(0, BlockFlags { gc: false })).collect();
        assert!(!remaining.iter().any(|b| b.block == blk.block));
    }
}
