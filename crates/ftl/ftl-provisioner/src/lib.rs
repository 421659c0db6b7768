//! The provisioner (§4.6): a timer-driven worker that keeps a bounded
//! pool of pre-erased, ready-to-open blocks per LUN, and flips each LUN's
//! emergency-GC bit when the media manager's free-block count runs low.
//! Grounded on the teacher's dedicated-worker-thread pattern
//! (`bins/obsidian/src/main.rs` spawns one thread per long-lived duty
//! rather than pulling in an executor).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use ftl_mapper::Mapper;
use ftl_media::{BlkMarkState, BlockFlags, EraseMode, MediaManager};
use tracing::{info, warn};

/// Bounds how many times the provisioner will fetch-and-discard a bad
/// block before giving up on filling a LUN's pool for this tick — a
/// device with no usable blocks left shouldn't spin the thread forever.
const MAX_ERASE_ATTEMPTS_PER_TICK: u32 = 8;

pub struct ProvisionerConfig {
    pub pool_depth: usize,
    pub emergency_threshold: usize,
    pub tick: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        ProvisionerConfig {
            pool_depth: 1,
            emergency_threshold: 2,
            tick: Duration::from_millis(10),
        }
    }
}

pub struct Provisioner {
    mapper: Arc<Mapper>,
    media: Arc<dyn MediaManager>,
    config: ProvisionerConfig,
    stop: Mutex<bool>,
    cv: Condvar,
}

impl Provisioner {
    pub fn new(mapper: Arc<Mapper>, media: Arc<dyn MediaManager>, config: ProvisionerConfig) -> Arc<Self> {
        Arc::new(Provisioner { mapper, media, config, stop: Mutex::new(false), cv: Condvar::new() })
    }

    /// One tick's worth of work for every LUN (§4.6). Public so tests and
    /// the `ftl-gcsim` demo can drive it synchronously instead of waiting
    /// on the timer.
    pub fn run_once(&self) {
        let geometry = self.media.geometry();
        for lun in 0..geometry.nr_luns {
            self.service_lun(lun);
        }
    }

    fn service_lun(&self, lun: u16) {
        let free = self.media.free_block_count(lun);
        let emergency = free < self.config.emergency_threshold;
        if emergency != self.mapper.lun(lun).is_emergency_gc() {
            warn!(lun, free, emergency, "emergency-GC state changed");
        }
        self.mapper.lun(lun).set_emergency_gc(emergency);

        let mut attempts = 0;
        while self.mapper.lun(lun).pool_len() < self.config.pool_depth
            && attempts < MAX_ERASE_ATTEMPTS_PER_TICK
        {
            attempts += 1;
            let Some(handle) = self.media.get_blk(lun, BlockFlags { gc: false }) else {
                break;
            };
            match self.media.erase_blk(handle, EraseMode::Normal) {
                Ok(()) => {
                    self.mapper.lun(lun).push_ready_block(handle.block);
                }
                Err(e) => {
                    warn!(lun, block = handle.block, ?e, "erase failed, marking block bad");
                    self.media.mark_blk(handle, BlkMarkState::Bad);
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("ftl-provisioner".into())
            .spawn(move || self.run_loop())
            .expect("spawning the provisioner thread")
    }

    fn run_loop(&self) {
        info!("provisioner started");
        loop {
            self.run_once();
            let stop = self.stop.lock().unwrap();
            if *stop {
                break;
            }
            let (stop, _timeout) = self.cv.wait_timeout(stop, self.config.tick).unwrap();
            if *stop {
                break;
            }
        }
        info!("provisioner stopped");
    }

    pub fn wake(&self) {
        self.cv.notify_all();
    }

    pub fn stop(&self) {
        *self.stop.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftl_types::Geometry;

    fn geom() -> Geometry {
        Geometry {
            nr_channels: 1,
            nr_luns: 2,
            planes_per_lun: 1,
            blocks_per_lun: 4,
            pages_per_blk: 4,
            sec_per_pg: 2,
            sec_size: ftl_types::SECTOR_SIZE as u32,
            min_write_pgs: 1,
            max_write_pgs: 4,
        }
    }

    #[test]
    fn run_once_fills_pool_to_depth() {
        let geometry = geom();
        let media: Arc<dyn MediaManager> = Arc::new(ftl_media::MockMedia::new(geometry).unwrap());
        let mapper = Arc::new(Mapper::new(geometry));
        let prov = Provisioner::new(mapper.clone(), media, ProvisionerConfig { pool_depth: 2, ..Default::default() });

        prov.run_once();
        assert_eq!(mapper.lun(0).pool_len(), 2);
        assert_eq!(mapper.lun(1).pool_len(), 2);
    }

    #[test]
    fn low_free_count_sets_emergency_gc() {
        let geometry = geom();
        let media: Arc<dyn MediaManager> = Arc::new(ftl_media::MockMedia::new(geometry).unwrap());
        // Drain LUN 0 down to one free block (blocks_per_lun = 4, threshold = 2).
        for _ in 0..3 {
            media.get_blk(0, BlockFlags { gc: false }).unwrap();
        }
        let mapper = Arc::new(Mapper::new(geometry));
        let prov = Provisioner::new(mapper.clone(), media, ProvisionerConfig { emergency_threshold: 2, ..Default::default() });

        prov.run_once();
        assert!(mapper.lun(0).is_emergency_gc());
        assert!(!mapper.lun(1).is_emergency_gc());
    }
}
