//! The write cache: a bounded, three-cursor ring buffer (§3, §4.1).
//!
//! `mem` (producer head), `subm` (submit/drain cursor) and `sync`
//! (persisted tail) always satisfy `sync ≤ subm ≤ mem` modulo the ring, and
//! `mem − sync ≤ capacity`. Unlike the teacher's lock-free broadcast ring
//! (built for readers that tolerate a stale value), every reader here must
//! observe the exact last write for a given LBA, so cursors are guarded by
//! blocking `Mutex`es rather than a seqlock (see SPEC_FULL.md §4.1).

mod entry;
mod guard;
mod ring;

pub use entry::Entry;
pub use guard::{DrainGuard, SyncGuard};
pub use ring::RingBuffer;
