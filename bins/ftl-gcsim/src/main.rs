use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use ftl_config::FtlConfig;
use ftl_core::Ftl;
use ftl_media::MockMedia;
use ftl_types::{ADDR_EMPTY, Lba, SECTOR_SIZE};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drives the GC write path end-to-end against a running `Ftl`: picks a
/// batch of "still live" LBAs, sprinkles in `ADDR_EMPTY` holes the way a
/// real collector's compaction pass leaves already-superseded entries
/// behind, and pushes the batch through `write_list_to_cache`. Stands in
/// for the external collector's *call pattern*, not its scan/selection
/// policy (out of scope per SPEC_FULL §1).
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    let config_path =
        std::env::var("FTL_GCSIM_CONFIG").unwrap_or_else(|_| "/etc/ftld/config.toml".to_string());
    let config = FtlConfig::load(&config_path).context("loading ftl config")?;

    let geometry = config.geometry.into();
    let media = Arc::new(MockMedia::new(geometry)?);
    let ftl = Ftl::new(config, media);
    let workers = ftl.spawn_workers();

    info!("ftl-gcsim: attached, driving the GC write path");

    let nr_secs = ftl.config().nr_secs;
    let mut next_lba: Lba = 0;
    let mut round: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        if ftl.mapper().any_emergency_gc() {
            warn!("ftl-gcsim: emergency GC active, backing off a tick");
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }

        let batch = gc_batch(next_lba, nr_secs);
        next_lba = (next_lba + batch.len() as u64) % nr_secs.max(1);
        round += 1;

        let live_data: Vec<_> = batch
            .iter()
            .map(|&lba| if lba == ADDR_EMPTY { [0u8; SECTOR_SIZE] } else { [(round % 256) as u8; SECTOR_SIZE] })
            .collect();
        let buf = Arc::new(live_data);

        if let Err(e) = ftl.write_list_to_cache(&batch, buf) {
            warn!(?e, "gc batch requeued");
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            info!(round, "ftl-gcsim: relocated {} gc batches so far", round);
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(5));
        if round >= 1000 {
            break;
        }
    }

    ftl.teardown();
    ftl.shutdown_workers(workers);
    info!("ftl-gcsim: done");
    Ok(())
}

/// A batch of 8 LBAs starting at `start`, with every third slot punched
/// out as `ADDR_EMPTY` to exercise the sparse-list skip in
/// `write_list_to_cache` (§3 boundary behaviour).
fn gc_batch(start: Lba, nr_secs: u64) -> Vec<Lba> {
    (0..8)
        .map(|i| {
            if i % 3 == 2 {
                ADDR_EMPTY
            } else if nr_secs == 0 {
                0
            } else {
                (start + i) % nr_secs
            }
        })
        .collect()
}
