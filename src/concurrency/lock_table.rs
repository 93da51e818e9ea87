//! Process-wide block locks.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::{JadbError, Result, TransactionID};
use crate::storage::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
enum LockState {
    Shared(HashSet<TransactionID>),
    Exclusive(TransactionID),
}

/// Shared and exclusive locks on blocks.
///
/// A request that cannot be granted waits until some transaction releases
/// its locks. If that does not happen within `max_wait` the request fails
/// with `LockAbort`, which is how deadlocks are broken.
#[derive(Debug)]
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, LockState>>,
    released: Condvar,
    max_wait: Duration,
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            max_wait,
        }
    }

    pub fn s_lock(&self, block: &BlockId, txn_id: TransactionID) -> Result<()> {
        self.acquire(block, txn_id, LockMode::Shared)
    }

    /// Grants an exclusive lock. A shared lock held only by `txn_id` is
    /// upgraded in place.
    pub fn x_lock(&self, block: &BlockId, txn_id: TransactionID) -> Result<()> {
        self.acquire(block, txn_id, LockMode::Exclusive)
    }

    /// Drops every lock `txn_id` holds on `blocks` and wakes all waiters.
    pub fn release_all<'a>(
        &self,
        txn_id: TransactionID,
        blocks: impl IntoIterator<Item = &'a BlockId>,
    ) {
        let mut locks = self.locks.lock();
        for block in blocks {
            let Entry::Occupied(mut entry) = locks.entry(block.clone()) else {
                continue;
            };
            let now_free = match entry.get_mut() {
                LockState::Shared(holders) => {
                    holders.remove(&txn_id);
                    holders.is_empty()
                }
                LockState::Exclusive(holder) => *holder == txn_id,
            };
            if now_free {
                entry.remove();
            }
        }
        drop(locks);
        self.released.notify_all();
    }

    /// Mode in which `txn_id` currently holds `block`, if at all.
    pub fn held_mode(&self, block: &BlockId, txn_id: TransactionID) -> Option<LockMode> {
        match self.locks.lock().get(block)? {
            LockState::Shared(holders) if holders.contains(&txn_id) => Some(LockMode::Shared),
            LockState::Exclusive(holder) if *holder == txn_id => Some(LockMode::Exclusive),
            _ => None,
        }
    }

    fn acquire(&self, block: &BlockId, txn_id: TransactionID, mode: LockMode) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();

        loop {
            if Self::try_grant(&mut locks, block, txn_id, mode) {
                debug!("txn {} holds {:?} lock on {}", txn_id, mode, block);
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(
                    "txn {} timed out waiting for {:?} lock on {}",
                    txn_id, mode, block
                );
                return Err(JadbError::LockAbort(block.clone()));
            }
            self.released.wait_until(&mut locks, deadline);
        }
    }

    // Checks for conflicts and records the grant in one step.
    fn try_grant(
        locks: &mut HashMap<BlockId, LockState>,
        block: &BlockId,
        txn_id: TransactionID,
        mode: LockMode,
    ) -> bool {
        let mut entry = match locks.entry(block.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(match mode {
                    LockMode::Shared => LockState::Shared(HashSet::from([txn_id])),
                    LockMode::Exclusive => LockState::Exclusive(txn_id),
                });
                return true;
            }
            Entry::Occupied(entry) => entry,
        };

        let upgrade = match entry.get_mut() {
            LockState::Exclusive(holder) => return *holder == txn_id,
            LockState::Shared(holders) => match mode {
                LockMode::Shared => {
                    holders.insert(txn_id);
                    return true;
                }
                LockMode::Exclusive => holders.iter().all(|holder| *holder == txn_id),
            },
        };
        if upgrade {
            entry.insert(LockState::Exclusive(txn_id));
        }
        upgrade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockId {
        BlockId::new("testfile", 1)
    }

    #[test]
    fn test_shared_locks_coexist() {
        let table = LockTable::new(Duration::from_millis(50));
        table.s_lock(&block(), TransactionID(1)).unwrap();
        table.s_lock(&block(), TransactionID(2)).unwrap();
        assert_eq!(table.held_mode(&block(), TransactionID(1)), Some(LockMode::Shared));
        assert_eq!(table.held_mode(&block(), TransactionID(2)), Some(LockMode::Shared));
    }

    #[test]
    fn test_sole_reader_upgrades_in_place() {
        let table = LockTable::new(Duration::from_millis(50));
        table.s_lock(&block(), TransactionID(1)).unwrap();
        table.x_lock(&block(), TransactionID(1)).unwrap();
        assert_eq!(table.held_mode(&block(), TransactionID(1)), Some(LockMode::Exclusive));

        table.release_all(TransactionID(1), [&block()]);
        assert_eq!(table.held_mode(&block(), TransactionID(1)), None);
        table.x_lock(&block(), TransactionID(2)).unwrap();
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let table = LockTable::new(Duration::from_millis(50));
        table.s_lock(&block(), TransactionID(1)).unwrap();
        table.s_lock(&block(), TransactionID(2)).unwrap();
        assert!(matches!(
            table.x_lock(&block(), TransactionID(1)),
            Err(JadbError::LockAbort(_))
        ));
        // The failed upgrade keeps the shared lock
        assert_eq!(table.held_mode(&block(), TransactionID(1)), Some(LockMode::Shared));
    }

    #[test]
    fn test_exclusive_holder_can_reacquire_shared() {
        let table = LockTable::new(Duration::from_millis(50));
        table.x_lock(&block(), TransactionID(1)).unwrap();
        table.s_lock(&block(), TransactionID(1)).unwrap();
        assert_eq!(table.held_mode(&block(), TransactionID(1)), Some(LockMode::Exclusive));
        assert!(table.s_lock(&block(), TransactionID(2)).is_err());
    }
}
