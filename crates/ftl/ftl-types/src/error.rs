/// Error kinds of §7.
///
/// `Requeue`/`Busy` are backoff signals, not failures: callers retry (the
/// host retries a whole request on `Requeue`; an internal caller yields and
/// retries on `Busy`). `Done` means the request was already completed
/// synchronously and needs no further work (e.g. a bare preflush). `FailWrite`
/// and `Oom` carry into the recovery / unwind paths described in §7.
#[derive(Debug, thiserror::Error)]
pub enum FtlError {
    /// Handled synchronously; caller has nothing further to do.
    #[error("done")]
    Done,

    /// Backpressure: caller should retry the whole request later.
    #[error("requeue")]
    Requeue,

    /// L2P contention on a cached entry with read-in-flight set; retry after a yield.
    #[error("busy")]
    Busy,

    /// A scoped allocation (DMA list, metadata list, ring reservation) failed.
    #[error("out of memory")]
    Oom,

    /// Per-sector device write failure; drives the recovery path of §4.5.
    #[error("write failed for ppa {0:?}")]
    FailWrite(crate::PhysicalAddr),

    /// Fatal for the request; nothing to retry.
    #[error("{0}")]
    Err(String),
}
