use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::buffer::BufferManager;
use crate::common::{Result, TransactionID};
use crate::concurrency::LockTable;
use crate::log_mod::LogManager;
use crate::storage::FileManager;
use crate::transaction::Transaction;

/// Hands out transactions over one set of shared services.
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
}

impl TransactionManager {
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        bm: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            fm,
            lm,
            bm,
            lock_table,
        }
    }

    pub fn begin(&self) -> Result<Transaction> {
        let txn_id = TransactionID(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        debug!("starting transaction {}", txn_id);
        Transaction::new(
            txn_id,
            Arc::clone(&self.fm),
            Arc::clone(&self.lm),
            Arc::clone(&self.bm),
            Arc::clone(&self.lock_table),
        )
    }
}
