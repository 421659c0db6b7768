use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use ftl_mapper::{MapOutcome, calc_secs_to_sync};
use ftl_media::{IoOp, IoRequest, SectorStatus};
use ftl_types::{ADDR_EMPTY, BlockRef, FtlError, Lba, PhysicalAddr, SECTOR_SIZE, Sector, SectorMeta};
use tracing::{info, warn};

use ftl_completion::SectorOutcome;
use ftl_perf::PerfStage;

use crate::context::Ftl;
use crate::perf::timed;

/// The dedicated drain worker (§4.4): pulls whatever's ready off the
/// ring, maps it, and submits it to the device, idling briefly when
/// there's nothing yet to do.
pub(crate) fn drain_loop(ftl: &Arc<Ftl>) {
    info!("drain loop started");
    while !ftl.is_stopping() {
        let progressed = drain_once(ftl);
        if !progressed {
            ftl.drain_signal.wait(Duration::from_millis(5));
        }
    }
    info!("drain loop stopped");
}

/// One drain iteration. Returns `false` when there was nothing to submit
/// this pass, so the caller knows to idle rather than spin.
pub(crate) fn drain_once(ftl: &Arc<Ftl>) -> bool {
    timed(PerfStage::DrainBatch, || drain_once_inner(ftl))
}

fn drain_once_inner(ftl: &Arc<Ftl>) -> bool {
    let min = ftl.geometry.min_write_pgs as u64;
    let max = ftl.geometry.max_write_pgs as u64;

    let Some((start, secs_to_com, secs_to_sync, flush_point)) = timed(PerfStage::RingDrainCommit, || {
        let mut drain = ftl.ring.read_lock();
        let avail = drain.secs_avail();
        let subm = drain.subm();
        let to_flush = ftl.ring.sync_point_count(subm);
        if avail == 0 && to_flush == 0 {
            return None;
        }
        let secs_to_sync = calc_secs_to_sync(avail, to_flush, min, max);
        if secs_to_sync == 0 {
            return None;
        }
        let secs_to_com = secs_to_sync.min(avail);
        let flush_point = if to_flush > 0 { Some(subm + to_flush) } else { None };
        let start = drain.read_commit(secs_to_com);
        Some((start, secs_to_com, secs_to_sync, flush_point))
    }) else {
        return false;
    };

    let to_flush_covered = flush_point.is_some_and(|p| p <= start + secs_to_sync);

    let emergency = ftl.mapper.any_emergency_gc();
    let nr_chunks = secs_to_sync / min;

    let mut ppas = Vec::with_capacity(secs_to_sync as usize);
    let mut datas = Vec::with_capacity(secs_to_sync as usize);
    let mut metas = Vec::with_capacity(secs_to_sync as usize);
    let mut ring_positions = Vec::with_capacity(secs_to_sync as usize);
    let mut owners = Vec::with_capacity(secs_to_sync as usize);
    let mut lbas = Vec::with_capacity(secs_to_sync as usize);

    // Counts sectors drawn from the logical `secs_to_sync` stream (ring
    // data plus flush-gap padding). Block-boundary padding, pushed by
    // `close_block_if_undersized` below, doesn't advance this counter —
    // it's extra capacity the request carries to close a block whose
    // remaining room fell short of a full `min`-sized group, distinct
    // from the padding the drain math itself already accounts for.
    let mut logical_idx = 0u64;

    for _ in 0..nr_chunks {
        let lun = ftl.mapper.next_lun(emergency);
        close_block_if_undersized(ftl, lun, min as u32, &mut ppas, &mut datas, &mut metas, &mut ring_positions, &mut owners, &mut lbas);

        let outcome = map_on_lun_with_retry(ftl, lun, min as u32);
        let owner = BlockRef { lun: outcome.lun, slot: outcome.block };
        for j in 0..outcome.count {
            let global_idx = logical_idx;
            logical_idx += 1;
            let sec = outcome.first_sec + j;
            let ppa = ftl.mapper.physical_addr(outcome.lun, outcome.block, sec);

            if global_idx < secs_to_com {
                let ring_pos = start + global_idx;
                let lba = ftl.ring.entry_lba(ring_pos);
                ftl.ring.stamp_paddr(ring_pos, ppa, owner);
                {
                    let mut blk = ftl.mapper.block(owner).lock().unwrap();
                    blk.stamp_lba(sec, lba);
                }
                ppas.push(ppa);
                datas.push(ftl.ring.sector_data(ring_pos));
                metas.push(SectorMeta { lba });
                ring_positions.push(Some(ring_pos));
                owners.push(owner);
                lbas.push(lba);
            } else {
                {
                    let mut blk = ftl.mapper.block(owner).lock().unwrap();
                    blk.stamp_lba(sec, ADDR_EMPTY);
                    blk.mark_invalid(sec);
                    blk.mark_synced(sec);
                }
                ppas.push(ppa);
                datas.push([0u8; SECTOR_SIZE]);
                metas.push(SectorMeta::EMPTY);
                ring_positions.push(None);
                owners.push(owner);
                lbas.push(ADDR_EMPTY);
            }
        }
    }

    if let Some(point) = flush_point {
        if to_flush_covered {
            ftl.ring.sync_point_reset(point);
        }
    }

    submit_device_write(ftl, ppas, datas, metas, ring_positions, owners, lbas);
    true
}

/// If `lun`'s current open block has some but not enough room for a full
/// `need`-sector group, pads its exact remainder (§4.4 step 4 boundary
/// case, §8 scenario 4) so it can close, and clears `current` so the
/// caller's subsequent allocation opens a fresh block. A no-op when the
/// block has either no room at all (already full — ordinary replacement
/// handles that) or enough room for the whole group.
#[allow(clippy::too_many_arguments)]
fn close_block_if_undersized(
    ftl: &Arc<Ftl>,
    lun: u16,
    need: u32,
    ppas: &mut Vec<PhysicalAddr>,
    datas: &mut Vec<Sector>,
    metas: &mut Vec<SectorMeta>,
    ring_positions: &mut Vec<Option<u64>>,
    owners: &mut Vec<BlockRef>,
    lbas: &mut Vec<Lba>,
) {
    let Some(block_num) = *ftl.mapper.lun(lun).current.lock().unwrap() else { return };
    let owner = BlockRef { lun, slot: block_num };
    let remaining = ftl.mapper.block(owner).lock().unwrap().remaining();
    if remaining == 0 || remaining >= need {
        return;
    }

    let first = {
        let mut blk = ftl.mapper.block(owner).lock().unwrap();
        blk.alloc_secs(remaining).expect("remaining is exactly what's left in this block")
    };
    for j in 0..remaining {
        let sec = first + j;
        let ppa = ftl.mapper.physical_addr(lun, block_num, sec);
        {
            let mut blk = ftl.mapper.block(owner).lock().unwrap();
            blk.stamp_lba(sec, ADDR_EMPTY);
            blk.mark_invalid(sec);
            blk.mark_synced(sec);
        }
        ppas.push(ppa);
        datas.push([0u8; SECTOR_SIZE]);
        metas.push(SectorMeta::EMPTY);
        ring_positions.push(None);
        owners.push(owner);
        lbas.push(ADDR_EMPTY);
    }
    *ftl.mapper.lun(lun).current.lock().unwrap() = None;
}

/// Allocates `count` consecutive sectors on `lun`'s current (or freshly
/// opened) block, backing off and nudging the provisioner awake on
/// `Requeue` rather than reporting the pool-empty condition up through
/// the drain loop (§5: bounded-yield retry). The LUN itself is chosen by
/// the caller — unlike `map_rr_page`, this never advances the
/// round-robin cursor, since `drain_once` already picked `lun` once per
/// chunk via `next_lun`.
fn map_on_lun_with_retry(ftl: &Arc<Ftl>, lun: u16, count: u32) -> MapOutcome {
    timed(PerfStage::MapOnLun, || map_on_lun_with_retry_inner(ftl, lun, count))
}

fn map_on_lun_with_retry_inner(ftl: &Arc<Ftl>, lun: u16, count: u32) -> MapOutcome {
    loop {
        match ftl.mapper.map_on_lun(lun, count) {
            Ok(outcome) => return outcome,
            Err(FtlError::Requeue) => {
                ftl.provisioner.wake();
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(_) => unreachable!("map_on_lun only returns Requeue or Ok"),
        }
    }
}

/// Dispatches one device write request and spawns the device-callback
/// thread that will process its completion (§4.5, §5). The drain loop
/// itself never blocks on device I/O.
fn submit_device_write(
    ftl: &Arc<Ftl>,
    ppas: Vec<PhysicalAddr>,
    datas: Vec<Sector>,
    metas: Vec<SectorMeta>,
    ring_positions: Vec<Option<u64>>,
    owners: Vec<BlockRef>,
    lbas: Vec<Lba>,
) {
    let (tx, rx) = mpsc::channel();
    let rq = IoRequest { op: IoOp::Write, ppas: ppas.clone(), data: datas, meta: metas, completion: tx };
    let submitted = timed(PerfStage::DeviceWriteSubmit, || ftl.media.submit_io(rq));
    if let Err(e) = submitted {
        warn!(?e, "device write submission failed");
        return;
    }

    let ftl = ftl.clone();
    std::thread::Builder::new()
        .name("ftl-write-completion".into())
        .spawn(move || {
            let Ok(completion) = rx.recv() else { return };
            let outcomes: Vec<SectorOutcome> = ppas
                .into_iter()
                .zip(completion.statuses)
                .enumerate()
                .filter_map(|(i, (ppa, status))| {
                    let ring_pos = ring_positions[i]?;
                    Some(SectorOutcome {
                        ring_pos: Some(ring_pos),
                        lba: lbas[i],
                        owner: owners[i],
                        ppa,
                        ok: status == SectorStatus::Ok,
                    })
                })
                .collect();

            let committed = timed(PerfStage::WriteCompletion, || ftl.completion.on_write_complete(outcomes, &*ftl));
            timed(PerfStage::L2pPublish, || {
                for c in committed {
                    if !ftl.l2p.complete_persist(c.lba, c.slot, c.ppa, c.owner) {
                        use ftl_l2p::SectorInvalidator;
                        ftl.mapper.mark_invalid(c.owner, c.ppa);
                    }
                }
            });
        })
        .expect("spawning write-completion thread");
}
