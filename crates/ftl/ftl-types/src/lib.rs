//! Shared wire vocabulary for the FTL data path.
//!
//! Every other `ftl-*` crate depends on this one for the logical/physical
//! address types, the ring's `WCtx`, the host-facing `Bio`, and the error
//! kinds of §7. Nothing here touches a lock or a thread — just data.

mod addr;
mod bio;
mod error;
mod geometry;
mod ppa;
mod sector;
mod wctx;

pub use addr::{ADDR_EMPTY, Lba};
pub use bio::{Bio, BioFlags, BioOp, BioResult};
pub use error::FtlError;
pub use geometry::Geometry;
pub use ppa::{BlockRef, PhysicalAddr, Ppa};
pub use sector::{SECTOR_SIZE, Sector, SectorMeta};
pub use wctx::{GcBuffer, GcBufRef, WCtx};
