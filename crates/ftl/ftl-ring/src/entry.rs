use ftl_types::{SECTOR_SIZE, Sector, WCtx};

/// One ring slot: the sector payload plus its write context (§3).
///
/// `w_ctx` is `None` until the slot has been written at least once; after
/// the first `write_entry` it is always `Some` — the ring never exposes a
/// half-initialized slot to a reader because `may_write`'s reservation
/// happens-before any reader can observe that position via `subm`/`sync`.
pub struct Entry {
    pub data: Sector,
    pub w_ctx: Option<WCtx>,
}

impl Entry {
    pub fn empty() -> Self {
        Entry {
            data: [0u8; SECTOR_SIZE],
            w_ctx: None,
        }
    }
}
