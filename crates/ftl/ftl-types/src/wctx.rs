use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::addr::Lba;
use crate::bio::{BioFlags, BioResult};
use crate::ppa::{BlockRef, PhysicalAddr};
use crate::sector::Sector;

/// Shared buffer backing a GC-originated write (§4.3, §9: "Ref-counted GC
/// buffers"). The GC path hands a batch of valid sectors to the write
/// cache; several ring entries may each reference one sector of the same
/// batch. `Arc` already gives us the refcounting the design note asks for —
/// the buffer is freed the moment the last `WCtx` holding a clone drains.
pub type GcBuffer = Vec<Sector>;
pub type GcBufRef = Arc<GcBuffer>;

/// Per-slot write context stored alongside the sector data in the ring
/// (§3). `paddr` collapses the original source's separate `ppa`/`paddr`
/// fields — one physical address per sector is all a single ring entry
/// ever needs here — and is filled in only once the drainer's
/// `map_rr_page` has allocated a destination (§4.4).
pub struct WCtx {
    pub lba: Lba,
    pub flags: BioFlags,
    /// Set only for GC-sourced writes; keeps the shared source buffer
    /// alive until this entry drains. This is the spec's opaque `priv` slot.
    pub gc_ref: Option<GcBufRef>,
    /// Destination physical address, assigned at drain time by the mapper.
    pub paddr: Option<PhysicalAddr>,
    /// Non-owning back-reference to the block that will own this sector
    /// once mapped (§9: arena index, not a pointer).
    pub owning_block: Option<BlockRef>,
    /// Originating host bio's completion channel, if any (nullable per §3).
    pub bio_completion: Option<Sender<BioResult>>,
}

impl WCtx {
    pub fn new(lba: Lba, flags: BioFlags) -> Self {
        WCtx {
            lba,
            flags,
            gc_ref: None,
            paddr: None,
            owning_block: None,
            bio_completion: None,
        }
    }
}
