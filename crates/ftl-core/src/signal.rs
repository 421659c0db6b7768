use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Wakes the dedicated drain thread (§4.4 step 1: "sleep briefly and
/// retry" when there's nothing to do; woken early by a preflush or a
/// data-carrying write, §4.3 steps 1 and 6).
///
/// Grounded on the provisioner's own `Condvar::wait_timeout` pattern
/// (`ftl-provisioner`) — the same shape, a separate instance, since the
/// drainer and the provisioner are independent dedicated workers (§5).
#[derive(Default)]
pub struct DrainSignal {
    kicked: Mutex<bool>,
    cv: Condvar,
}

impl DrainSignal {
    pub fn new() -> Self {
        DrainSignal { kicked: Mutex::new(false), cv: Condvar::new() }
    }

    pub fn kick(&self) {
        *self.kicked.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// Blocks until kicked or `timeout` elapses, whichever comes first;
    /// always clears the flag before returning so spurious extra kicks
    /// don't pile up.
    pub fn wait(&self, timeout: Duration) {
        let mut kicked = self.kicked.lock().unwrap();
        if !*kicked {
            let (guard, _) = self.cv.wait_timeout(kicked, timeout).unwrap();
            kicked = guard;
        }
        *kicked = false;
    }
}
