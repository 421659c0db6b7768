/// Global, device-addressable physical address: `{ch, lun, plane, block, page, sector}`.
///
/// This is the packed form handed to the media manager's `submit_io`. It
/// never appears alongside a cacheline tag — conversion to/from the wire
/// form happens only at the `ftl-media` boundary (§9: "provide conversions
/// to/from the device's packed form at the boundary only").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalAddr {
    pub ch: u16,
    pub lun: u16,
    pub plane: u16,
    pub block: u32,
    pub page: u32,
    pub sector: u16,
}

/// Arena index into a LUN's block table — a non-owning back-reference from
/// a ring entry or L2P entry to the block that owns a sector (§9: "model as
/// an arena index to avoid an ownership cycle with the LUN's block list").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub lun: u16,
    pub slot: u32,
}

/// Tagged physical address (§9): either the value lives in the ring
/// (`Cached`), has been persisted to media (`Persisted`), or the LBA has
/// never been written (`Empty`).
///
/// `read_inflight` widens the single source bit to a small saturating
/// counter (§9 open question: "insufficient for multiple concurrent
/// readers... document as a limitation or widen to a small counter" — we
/// widen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ppa {
    Cached { slot: u32, read_inflight: u8 },
    Persisted(PhysicalAddr),
    Empty,
}

impl Ppa {
    pub fn is_cached(&self) -> bool {
        matches!(self, Ppa::Cached { .. })
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Ppa::Persisted(_))
    }

    pub fn cached_slot(&self) -> Option<u32> {
        match self {
            Ppa::Cached { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Marks one more concurrent reader in flight on this cached entry.
    /// Saturates rather than overflows; see the widened-counter note above.
    pub fn mark_read_inflight(&mut self) {
        if let Ppa::Cached { read_inflight, .. } = self {
            *read_inflight = read_inflight.saturating_add(1);
        }
    }

    pub fn clear_read_inflight(&mut self) {
        if let Ppa::Cached { read_inflight, .. } = self {
            *read_inflight = read_inflight.saturating_sub(1);
        }
    }

    pub fn is_read_inflight(&self) -> bool {
        matches!(self, Ppa::Cached { read_inflight, .. } if *read_inflight > 0)
    }
}
