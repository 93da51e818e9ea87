use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{Result, TransactionID};
use crate::concurrency::{LockMode, LockTable};
use crate::storage::BlockId;

/// One transaction's view of the lock table.
///
/// Locks are only ever added until `release`, which drops all of them at
/// once (strict two-phase locking).
pub struct ConcurrencyManager {
    txn_id: TransactionID,
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    pub fn new(txn_id: TransactionID, lock_table: Arc<LockTable>) -> Self {
        Self {
            txn_id,
            lock_table,
            locks: HashMap::new(),
        }
    }

    pub fn s_lock(&mut self, block: &BlockId) -> Result<()> {
        if !self.locks.contains_key(block) {
            self.lock_table.s_lock(block, self.txn_id)?;
            self.locks.insert(block.clone(), LockMode::Shared);
        }
        Ok(())
    }

    pub fn x_lock(&mut self, block: &BlockId) -> Result<()> {
        if !self.has_x_lock(block) {
            self.lock_table.x_lock(block, self.txn_id)?;
            self.locks.insert(block.clone(), LockMode::Exclusive);
        }
        Ok(())
    }

    pub fn release(&mut self) {
        self.lock_table.release_all(self.txn_id, self.locks.keys());
        self.locks.clear();
    }

    pub fn lock_mode(&self, block: &BlockId) -> Option<LockMode> {
        self.locks.get(block).copied()
    }

    fn has_x_lock(&self, block: &BlockId) -> bool {
        self.locks.get(block) == Some(&LockMode::Exclusive)
    }
}
