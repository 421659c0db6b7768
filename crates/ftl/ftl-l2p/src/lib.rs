//! The L2P map (§4.2): one global lock over a dense array of `{ppa,
//! blk_ref}` entries keyed by LBA. The read path's orchestration (blending
//! cache hits with device reads) lives in `ftl-core`, which is the only
//! crate that sees the ring buffer, the map, and the media manager
//! together; this crate owns just the map's state and its locked
//! transitions.

mod invalidator;
mod map;

pub use invalidator::SectorInvalidator;
pub use map::{L2pEntry, L2pMap};
