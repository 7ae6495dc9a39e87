/// Sandbox slot allocation
///
/// A submission is mapped to one of `N` sandbox slots by hashing its id.
/// There is no allocation table: two submissions whose ids land on the same
/// slot will share it if they run at the same time. `SlotLeases` closes that
/// gap when enabled by serializing runs per slot.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy)]
pub struct SlotAllocator {
    slot_count: u32,
}

impl SlotAllocator {
    pub fn new(slot_count: u32) -> Self {
        Self {
            slot_count: slot_count.max(1),
        }
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    /// Deterministic slot in `[0, slot_count)` for a submission id.
    pub fn slot_for(&self, submission_id: &str) -> u32 {
        id_hash(submission_id).unsigned_abs() % self.slot_count
    }
}

/// 31-multiplier polynomial hash over UTF-16 code units. Keeps slot
/// assignment identical to the producers that already shard by this hash.
fn id_hash(id: &str) -> i32 {
    id.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// One async mutex per slot. Holding the guard means exclusive use of the
/// slot from provisioning until teardown.
#[derive(Debug, Clone)]
pub struct SlotLeases {
    locks: Arc<Vec<Arc<Mutex<()>>>>,
}

pub type SlotLease = OwnedMutexGuard<()>;

impl SlotLeases {
    pub fn new(slot_count: u32) -> Self {
        let locks = (0..slot_count.max(1))
            .map(|_| Arc::new(Mutex::new(())))
            .collect();
        Self {
            locks: Arc::new(locks),
        }
    }

    /// Wait until `slot` is free and take it.
    pub async fn acquire(&self, slot: u32) -> SlotLease {
        let lock = self.locks[slot as usize % self.locks.len()].clone();
        lock.lock_owned().await
    }

    pub fn is_leased(&self, slot: u32) -> bool {
        self.locks[slot as usize % self.locks.len()].try_lock().is_err()
    }
}
