use std::sync::{Condvar, Mutex};

/// The inflight-write cap (§4.3 step 5, §9 Open Question: the source's
/// `atomic_inc_below` hard-codes 400000; here it's a constructor
/// parameter — see `FtlConfig::inflight_cap`). Submission parks in
/// `admit` when the cap would be exceeded; completion calls `release` as
/// sectors finish, waking parked admitters.
pub struct InflightGate {
    count: Mutex<u64>,
    cap: u64,
    cv: Condvar,
}

impl InflightGate {
    pub fn new(cap: u64) -> Self {
        InflightGate { count: Mutex::new(0), cap, cv: Condvar::new() }
    }

    pub fn admit(&self, n: u64) {
        let mut count = self.count.lock().unwrap();
        while *count + n > self.cap {
            count = self.cv.wait(count).unwrap();
        }
        *count += n;
    }

    pub fn release(&self, n: u64) {
        let mut count = self.count.lock().unwrap();
        *count = count.saturating_sub(n);
        drop(count);
        self.cv.notify_all();
    }

    pub fn current(&self) -> u64 {
        *self.count.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn admit_blocks_until_release_frees_capacity() {
        let gate = Arc::new(InflightGate::new(2));
        gate.admit(2);
        assert_eq!(gate.current(), 2);

        let g2 = gate.clone();
        let handle = thread::spawn(move || {
            g2.admit(1);
        });

        thread::sleep(std::time::Duration::from_millis(20));
        gate.release(1);
        handle.join().unwrap();
        assert_eq!(gate.current(), 2);
    }
}
