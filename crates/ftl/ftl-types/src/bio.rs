use std::sync::mpsc::Sender;

use crate::addr::Lba;
use crate::error::FtlError;
use crate::sector::Sector;

/// The operation a [`Bio`] carries. `Flush` models a bare PREFLUSH with no
/// data (§4.3 step 1); a flush attached to a data-carrying write is instead
/// `BioFlags::preflush` on a `Write` bio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioOp {
    Read,
    Write,
    Discard,
    Flush,
}

/// Flags carried on a bio and copied into the ring's `WCtx` (§3, §4.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BioFlags {
    pub preflush: bool,
    /// Set for GC-originated writes (`write_list_to_cache`); lets these
    /// bypass the emergency-GC gate (§4.3) and take elevated LUN priority
    /// in the round-robin picker (§4.4).
    pub gc: bool,
}

/// Outcome of a completed bio: `None` for writes/discards/flushes, `Some`
/// with the read payload for reads.
pub type BioResult = Result<Option<Vec<Sector>>, FtlError>;

/// Host-facing request (§6): "accepts bio-shaped requests with READ, WRITE,
/// DISCARD, and PREFLUSH flags; completes them with success or an error;
/// `secs_per_request ≤ 64`."
///
/// The out-of-scope bio/page-allocator plumbing is represented here only by
/// the minimal surface the data path actually touches: an address range, an
/// optional payload, and a completion channel.
pub struct Bio {
    pub op: BioOp,
    pub lba: Lba,
    pub nr_secs: u32,
    pub flags: BioFlags,
    /// Write payload, one entry per sector. Empty for reads/discards/flushes.
    pub data: Vec<Sector>,
    /// Signalled exactly once when the bio is done. `None` lets tests and
    /// the GC path fire-and-forget.
    pub completion: Option<Sender<BioResult>>,
}

/// Per §6, host requests never exceed this many sectors.
pub const MAX_SECS_PER_REQUEST: u32 = 64;

impl Bio {
    pub fn read(lba: Lba, nr_secs: u32) -> Self {
        Bio {
            op: BioOp::Read,
            lba,
            nr_secs,
            flags: BioFlags::default(),
            data: Vec::new(),
            completion: None,
        }
    }

    pub fn write(lba: Lba, data: Vec<Sector>) -> Self {
        let nr_secs = data.len() as u32;
        Bio {
            op: BioOp::Write,
            lba,
            nr_secs,
            flags: BioFlags::default(),
            data,
            completion: None,
        }
    }

    pub fn discard(lba: Lba, nr_secs: u32) -> Self {
        Bio {
            op: BioOp::Discard,
            lba,
            nr_secs,
            flags: BioFlags::default(),
            data: Vec::new(),
            completion: None,
        }
    }

    /// A bare PREFLUSH carrying no data (§4.3 step 1).
    pub fn flush() -> Self {
        Bio {
            op: BioOp::Flush,
            lba: 0,
            nr_secs: 0,
            flags: BioFlags {
                preflush: true,
                gc: false,
            },
            data: Vec::new(),
            completion: None,
        }
    }

    pub fn with_preflush(mut self) -> Self {
        self.flags.preflush = true;
        self
    }

    pub fn with_completion(mut self, tx: Sender<BioResult>) -> Self {
        self.completion = Some(tx);
        self
    }

    pub fn complete(self, result: BioResult) {
        if let Some(tx) = self.completion {
            let _ = tx.send(result);
        }
    }
}
