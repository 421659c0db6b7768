use std::collections::VecDeque;
use std::sync::Mutex;

/// Per-LUN bookkeeping split across the two lock tiers the mapper needs
/// (§5: "Block `rlun->lock_lists`" then "LUN `rlun->lock`"): `lists`
/// guards the pre-erased pool queue the provisioner fills, `current`
/// guards which block number is presently open for allocation. Keeping
/// them as separate `Mutex`es (rather than one struct lock) is what lets
/// the provisioner push a block while the mapper is mid-allocation on a
/// different block.
pub struct LunState {
    pub lists: Mutex<LunLists>,
    pub current: Mutex<Option<u32>>,
}

pub struct LunLists {
    pub pool: VecDeque<u32>,
    pub emergency_gc: bool,
}

impl LunState {
    pub fn new() -> Self {
        LunState {
            lists: Mutex::new(LunLists { pool: VecDeque::new(), emergency_gc: false }),
            current: Mutex::new(None),
        }
    }

    pub fn pool_len(&self) -> usize {
        self.lists.lock().unwrap().pool.len()
    }

    pub fn push_ready_block(&self, block: u32) {
        self.lists.lock().unwrap().pool.push_back(block);
    }

    pub fn is_emergency_gc(&self) -> bool {
        self.lists.lock().unwrap().emergency_gc
    }

    pub fn set_emergency_gc(&self, on: bool) {
        self.lists.lock().unwrap().emergency_gc = on;
    }

    /// Pops the next pre-erased block from the pool, `None` if empty.
    pub fn take_ready_block(&self) -> Option<u32> {
        self.lists.lock().unwrap().pool.pop_front()
    }
}

impl Default for LunState {
    fn default() -> Self {
        Self::new()
    }
}
