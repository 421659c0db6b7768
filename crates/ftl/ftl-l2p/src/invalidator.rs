use ftl_types::{BlockRef, PhysicalAddr};

/// The L2P's one collaborator: when a mapping update or discard retires a
/// persisted entry, something has to mark that sector invalid on its
/// owning block (§4.2, "possibly triggering block close"). The mapper owns
/// that state machine; the L2P only needs to notify it, so the dependency
/// runs through this trait rather than a direct crate dependency (which
/// would be circular — the mapper also looks entries up in the L2P).
pub trait SectorInvalidator: Send + Sync {
    fn mark_invalid(&self, owner: BlockRef, ppa: PhysicalAddr);
}
