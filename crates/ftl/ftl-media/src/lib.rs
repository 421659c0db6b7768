//! The media-manager contract consumed by the core (§6), plus a mock
//! implementation used by tests and the demo binaries.
//!
//! The real media manager — bad-block scanning, DMA pools, the actual
//! channel/LUN controllers — is out of scope (§1). This crate only fixes
//! the *shape* of that collaborator so the rest of the workspace can be
//! built and tested against it.

mod contract;
mod mock;

pub use contract::{BlockFlags, BlockHandle, BlkMarkState, EraseMode, IoCompletion, IoOp, IoRequest, MediaManager, SectorStatus};
pub use mock::MockMedia;
