//! The allocator/mapper (§4.4): round-robins user writes across LUNs at
//! page granularity, tracks each block's lifecycle and bitmaps, and
//! builds the per-block recovery page on close.

mod bitmap;
mod block;
mod calc;
mod lun;
mod mapper;
mod recovery;

pub use block::{Block, BlockState};
pub use calc::calc_secs_to_sync;
pub use lun::{LunLists, LunState};
pub use mapper::{MapOutcome, Mapper};
pub use recovery::{RecoveryPage, crc32_ieee};
