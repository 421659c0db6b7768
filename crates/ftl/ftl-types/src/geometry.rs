/// Device geometry, as published by the media manager (§6).
///
/// The core never mutates this; it is loaded once from config and handed
/// around as `Arc<Geometry>`.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub nr_channels: u16,
    pub nr_luns: u16,
    pub planes_per_lun: u16,
    pub blocks_per_lun: u32,
    pub pages_per_blk: u32,
    pub sec_per_pg: u16,
    pub sec_size: u32,

    /// Device write granularity, in sectors. Every submitted write is a
    /// multiple of this (§4.4, §8).
    pub min_write_pgs: u32,
    /// Upper bound on sectors per device write request.
    pub max_write_pgs: u32,
}

impl Geometry {
    /// Data sectors per block: one page (`sec_per_pg` sectors) at the tail
    /// of the block is reserved for the `rlpg` recovery page stamped on close.
    pub fn nr_blk_dsecs(&self) -> u32 {
        self.pages_per_blk
            .saturating_sub(1)
            .saturating_mul(self.sec_per_pg as u32)
    }

    /// Total sectors per LUN, data sectors only (recovery pages excluded).
    pub fn secs_per_lun(&self) -> u64 {
        self.nr_blk_dsecs() as u64 * self.blocks_per_lun as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        Geometry {
            nr_channels: 1,
            nr_luns: 4,
            planes_per_lun: 1,
            blocks_per_lun: 16,
            pages_per_blk: 256,
            sec_per_pg: 4,
            sec_size: 4096,
            min_write_pgs: 4,
            max_write_pgs: 64,
        }
    }

    #[test]
    fn nr_blk_dsecs_excludes_rlpg_page() {
        let g = geo();
        assert_eq!(g.nr_blk_dsecs(), 255 * 4);
    }
}
