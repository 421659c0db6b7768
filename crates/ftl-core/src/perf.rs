use std::cell::RefCell;

use ftl_perf::{PerfRecorder, PerfStage};

thread_local! {
    static RECORDER: RefCell<PerfRecorder> = RefCell::new(PerfRecorder::new());
}

/// Times `f` under `stage` via the thread-local recorder. A no-op on the
/// default build (`PerfRecorder` is zero-sized without the `record`
/// feature); each dedicated worker thread (drain, write-completion) gets
/// its own recorder, matching the teacher's one-recorder-per-engine-thread
/// layout in `bins/obsidian`/`bins/onyx`.
pub(crate) fn timed<T>(stage: PerfStage, f: impl FnOnce() -> T) -> T {
    RECORDER.with(|r| r.borrow_mut().begin(stage));
    let out = f();
    RECORDER.with(|r| r.borrow_mut().end(stage));
    out
}
