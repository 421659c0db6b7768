use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ftl_completion::CompletionPipeline;
use ftl_config::FtlConfig;
use ftl_l2p::L2pMap;
use ftl_mapper::Mapper;
use ftl_media::MediaManager;
use ftl_provisioner::{Provisioner, ProvisionerConfig};
use ftl_ring::RingBuffer;
use ftl_types::Geometry;
use tracing::info;

use crate::signal::DrainSignal;

/// The process-wide context tying the six components together (§9:
/// "Pass them through an explicit context argument; do not reach for
/// ambient state"). One `Ftl` is constructed per device; every data-path
/// entry point (`buffer_write`, `submit_read`, `submit_discard`,
/// `write_list_to_cache`) is a method on it.
pub struct Ftl {
    pub(crate) config: FtlConfig,
    pub(crate) geometry: Geometry,
    pub(crate) ring: Arc<RingBuffer>,
    pub(crate) l2p: Arc<L2pMap>,
    pub(crate) mapper: Arc<Mapper>,
    pub(crate) media: Arc<dyn MediaManager>,
    pub(crate) completion: Arc<CompletionPipeline>,
    pub(crate) provisioner: Arc<Provisioner>,
    pub(crate) drain_signal: Arc<DrainSignal>,
    stop: AtomicBool,
}

/// Join handles for the two dedicated background workers (§4.4, §4.6).
/// Kept separate from `Ftl` itself so tests can construct an `Ftl` and
/// drive `drain_once`/`provisioner.run_once` synchronously without ever
/// spawning a thread.
pub struct Workers {
    pub provisioner: std::thread::JoinHandle<()>,
    pub drain: std::thread::JoinHandle<()>,
}

impl Ftl {
    pub fn new(config: FtlConfig, media: Arc<dyn MediaManager>) -> Arc<Self> {
        let geometry: Geometry = config.geometry.into();
        let ring = Arc::new(RingBuffer::new(config.ring_capacity));
        let l2p = Arc::new(L2pMap::new(config.nr_secs as usize));
        let mapper = Arc::new(Mapper::new(geometry));
        let completion = Arc::new(CompletionPipeline::new(
            ring.clone(),
            mapper.clone(),
            config.inflight_cap,
        ));
        let provisioner = Provisioner::new(
            mapper.clone(),
            media.clone(),
            ProvisionerConfig {
                pool_depth: config.pool_depth,
                emergency_threshold: config.emergency_threshold,
                tick: config.provisioner_tick(),
            },
        );

        Arc::new(Ftl {
            config,
            geometry,
            ring,
            l2p,
            mapper,
            media,
            completion,
            provisioner,
            drain_signal: Arc::new(DrainSignal::new()),
            stop: AtomicBool::new(false),
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn config(&self) -> &FtlConfig {
        &self.config
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn l2p(&self) -> &Arc<L2pMap> {
        &self.l2p
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.provisioner
    }

    /// Runs the provisioner and drain dedicated workers on their own
    /// threads (§4.4, §4.6; grounded on the teacher's
    /// `std::thread::spawn`-per-duty pattern in `bins/obsidian`). Tests
    /// that want single-stepped, deterministic control instead call
    /// `Provisioner::run_once` and `crate::drain::drain_once` directly.
    pub fn spawn_workers(self: &Arc<Self>) -> Workers {
        let provisioner = self.provisioner.clone().spawn();
        let ftl = self.clone();
        let drain = std::thread::Builder::new()
            .name("ftl-drain".into())
            .spawn(move || crate::drain::drain_loop(&ftl))
            .expect("spawning the drain thread");
        Workers { provisioner, drain }
    }

    /// Signals both workers to stop and joins them. Does not flush
    /// outstanding writes first — callers that want a clean shutdown call
    /// `teardown` beforehand (§4.7).
    pub fn shutdown_workers(&self, workers: Workers) {
        self.stop.store(true, Ordering::SeqCst);
        self.provisioner.stop();
        self.drain_signal.kick();
        let _ = workers.drain.join();
        let _ = workers.provisioner.join();
        info!("ftl workers shut down");
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
