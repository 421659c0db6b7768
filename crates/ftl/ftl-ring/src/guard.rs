use std::sync::MutexGuard;

use crate::ring::{ReadState, RingBuffer, SyncState};

/// Held by the single drainer while it inspects and advances `subm` (§4.1:
/// `read_lock`/`read_commit`/`read_unlock`). Dropping the guard is the
/// `read_unlock` call — only one `DrainGuard` can exist at a time because
/// it holds the ring's read mutex.
pub struct DrainGuard<'a> {
    pub(crate) ring: &'a RingBuffer,
    pub(crate) guard: MutexGuard<'a, ReadState>,
    pub(crate) mem: u64,
}

impl DrainGuard<'_> {
    /// Sectors produced but not yet handed to a device write.
    pub fn secs_avail(&self) -> u64 {
        self.mem.saturating_sub(self.guard.subm)
    }

    pub fn subm(&self) -> u64 {
        self.guard.subm
    }

    pub fn ring(&self) -> &RingBuffer {
        self.ring
    }

    /// Advances `subm` by `min(n, secs_avail())`, returning the starting
    /// position of the batch just claimed for drain.
    pub fn read_commit(&mut self, n: u64) -> u64 {
        let pos = self.guard.subm;
        let n = n.min(self.secs_avail());
        self.guard.subm += n;
        pos
    }
}

/// Held by the completion path while it advances `sync` in strict ring
/// order (§4.1: `sync_init`/`sync_advance`/`sync_end`). Dropping the guard
/// is `sync_end`.
pub struct SyncGuard<'a> {
    pub(crate) guard: MutexGuard<'a, SyncState>,
}

impl SyncGuard<'_> {
    pub fn sync(&self) -> u64 {
        self.guard.sync
    }

    /// Advances `sync` by `n`, returning the new value. The ring's
    /// persistence guarantee — "all bytes below `sync` are durable" — is
    /// upheld entirely by the caller only ever calling this when the
    /// advancing range is contiguous with the current `sync` (§4.5).
    pub fn sync_advance(&mut self, n: u64) -> u64 {
        self.guard.sync += n;
        self.guard.sync
    }
}
