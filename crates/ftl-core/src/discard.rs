use ftl_types::Bio;

use crate::context::Ftl;

impl Ftl {
    /// §4.2 `invalidate_range`: drops both cached and persisted mappings
    /// in the range, marking any persisted sector invalid on its owning
    /// block.
    pub fn submit_discard(&self, mut bio: Bio) {
        self.l2p.invalidate_range(bio.lba, bio.nr_secs as u64, self.mapper.as_ref());
        bio.complete(Ok(None));
    }
}
