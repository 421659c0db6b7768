use std::sync::Mutex;

use ftl_types::{BlockRef, FtlError, Lba, PhysicalAddr, Ppa};

use crate::invalidator::SectorInvalidator;

/// `{ppa, blk_ref}` keyed by LBA (§4.1 data model). `blk_ref` is only
/// meaningful when `ppa` is `Persisted` — it is the back-reference used to
/// find the owning block's invalid-sector bitmap without scanning.
#[derive(Clone, Copy)]
pub struct L2pEntry {
    pub ppa: Ppa,
    pub blk_ref: Option<BlockRef>,
}

impl L2pEntry {
    const EMPTY: L2pEntry = L2pEntry { ppa: Ppa::Empty, blk_ref: None };
}

/// One global lock over a dense `nr_secs`-length array (§4.2). Every
/// public method here takes the lock for the L2P tier of the hierarchy
/// documented on `Ftl` — L2P first, then whatever `SectorInvalidator`
/// acquires beneath it.
pub struct L2pMap {
    entries: Mutex<Vec<L2pEntry>>,
}

impl L2pMap {
    pub fn new(nr_secs: usize) -> Self {
        L2pMap { entries: Mutex::new(vec![L2pEntry::EMPTY; nr_secs]) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Current mapping for `lba`, without side effects. Used by tests and
    /// by callers that already hold the invariant they need (e.g. recovery
    /// re-checking after taking the block lock).
    pub fn peek(&self, lba: Lba) -> Ppa {
        self.entries.lock().unwrap()[lba as usize].ppa
    }

    /// Read-path step 1 (§4.2): snapshot the PPA and, if cached, mark the
    /// read-in-flight bit so a concurrent `update_map` yields instead of
    /// overwriting the slot out from under this read.
    pub fn snapshot_for_read(&self, lba: Lba) -> Ppa {
        let mut entries = self.entries.lock().unwrap();
        let e = &mut entries[lba as usize];
        e.ppa.mark_read_inflight();
        e.ppa
    }

    /// Read-path step 5: clear the read-in-flight bit taken in
    /// `snapshot_for_read`. No-op if the entry has since moved on (the slot
    /// was invalidated and reused — the bit on the old value doesn't exist
    /// anymore by the time this runs since it only ever reads the *current*
    /// entry).
    pub fn clear_read_inflight(&self, lba: Lba) {
        let mut entries = self.entries.lock().unwrap();
        entries[lba as usize].ppa.clear_read_inflight();
    }

    /// §4.2 `update_map`. Returns `Busy` if the existing entry is cached
    /// with a read in flight; the caller yields and retries (§4.3 step 4,
    /// §4.4 step 5's write path, §5's retry discipline).
    pub fn update_map(
        &self,
        lba: Lba,
        new_ppa: Ppa,
        new_owner: Option<BlockRef>,
        invalidator: &dyn SectorInvalidator,
    ) -> Result<(), FtlError> {
        let mut entries = self.entries.lock().unwrap();
        let e = &mut entries[lba as usize];
        if e.ppa.is_read_inflight() {
            return Err(FtlError::Busy);
        }
        if let (Ppa::Persisted(old_ppa), Some(old_owner)) = (e.ppa, e.blk_ref) {
            invalidator.mark_invalid(old_owner, old_ppa);
        }
        e.ppa = new_ppa;
        e.blk_ref = new_owner;
        Ok(())
    }

    /// Write-completion's handoff from cached to persisted (§4.5): the
    /// ring position that was published as `Cached{slot}` at submission
    /// time has now been durably written to `new_ppa`. Publishes the
    /// persisted mapping only if the entry still points at that exact
    /// cached slot; returns `false` if the LBA was overwritten again
    /// before this completion arrived (scenario 3, §8) — the caller is
    /// then holding a stale, now-superseded physical sector and must
    /// invalidate it directly on its own owning block rather than touch
    /// the L2P, since the current entry belongs to the newer write.
    ///
    /// Unlike `update_map`, this never returns `Busy`: a concurrent
    /// reader's read-in-flight bit guards the ring *slot* against being
    /// overwritten by a new write, not against this address-only
    /// transition — the bytes a reader copies from the cached slot are
    /// unchanged by relabeling its backing store as persisted.
    pub fn complete_persist(
        &self,
        lba: Lba,
        slot: u32,
        new_ppa: PhysicalAddr,
        owner: BlockRef,
    ) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let e = &mut entries[lba as usize];
        match e.ppa.cached_slot() {
            Some(s) if s == slot => {
                e.ppa = Ppa::Persisted(new_ppa);
                e.blk_ref = Some(owner);
                true
            }
            _ => false,
        }
    }

    /// §4.2 `invalidate_range` / discard. Clears `n` entries starting at
    /// `slba`; persisted entries are reported to the owning block first
    /// (boundary note: a cached entry in the range is simply dropped, its
    /// data having never left the ring).
    pub fn invalidate_range(&self, slba: Lba, n: u64, invalidator: &dyn SectorInvalidator) {
        let mut entries = self.entries.lock().unwrap();
        for lba in slba..slba + n {
            let e = &mut entries[lba as usize];
            if let (Ppa::Persisted(ppa), Some(owner)) = (e.ppa, e.blk_ref) {
                invalidator.mark_invalid(owner, ppa);
            }
            *e = L2pEntry::EMPTY;
        }
    }
}
