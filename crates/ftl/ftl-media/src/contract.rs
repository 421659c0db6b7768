use std::sync::mpsc::Sender;

use ftl_types::{FtlError, Geometry, PhysicalAddr, Sector, SectorMeta};

/// Flags passed to `get_blk` (§6). `GC` requests a block for garbage
/// collection's re-remap writes rather than ordinary host traffic; the
/// mock ignores the distinction but a real manager could use it to bias
/// wear-levelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags {
    pub gc: bool,
}

/// A block on a LUN, as handed out by `get_blk`. Opaque beyond the
/// `lun`/`block` pair the core needs to form `PhysicalAddr`s within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub lun: u16,
    pub block: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlkMarkState {
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorStatus {
    Ok,
    Fail,
}

/// A device I/O request (§6). For `Write`, `data`/`meta` are inputs; for
/// `Read`, `data` arrives zeroed and is filled in before `completion` fires.
pub struct IoRequest {
    pub op: IoOp,
    pub ppas: Vec<PhysicalAddr>,
    pub data: Vec<Sector>,
    pub meta: Vec<SectorMeta>,
    pub completion: Sender<IoCompletion>,
}

/// Per-sector completion status, one entry per `ppas`/`data` slot (§4.5).
pub struct IoCompletion {
    pub data: Vec<Sector>,
    pub statuses: Vec<SectorStatus>,
}

/// The media manager's contract (§6): block lifecycle, geometry, and async
/// I/O dispatch. Implementations are required to be `Send + Sync` since
/// the core holds one behind an `Arc` shared by the drainer, provisioner,
/// and completion threads.
pub trait MediaManager: Send + Sync {
    fn geometry(&self) -> Geometry;

    /// Pulls a pre-erased-ready block for `lun`, or `None` if the LUN has
    /// none available (caller should fall back to the provisioner's pool
    /// or signal emergency GC).
    fn get_blk(&self, lun: u16, flags: BlockFlags) -> Option<BlockHandle>;

    fn put_blk(&self, blk: BlockHandle);

    fn mark_blk(&self, blk: BlockHandle, state: BlkMarkState);

    /// Number of blocks on `lun` not currently handed out or marked bad —
    /// what the provisioner compares against the emergency-GC threshold.
    fn free_block_count(&self, lun: u16) -> usize;

    fn erase_blk(&self, blk: BlockHandle, mode: EraseMode) -> Result<(), FtlError>;

    /// Dispatches `rq` asynchronously; `rq.completion` fires on a
    /// device-callback thread (§5) with one status per sector.
    fn submit_io(&self, rq: IoRequest) -> Result<(), FtlError>;
}
