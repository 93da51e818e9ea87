use std::sync::Arc;

use log::{info, warn};

use crate::buffer::BufferManager;
use crate::common::{JadbError, Result, TransactionID};
use crate::concurrency::{ConcurrencyManager, LockTable};
use crate::log_mod::LogManager;
use crate::recovery::RecoveryManager;
use crate::storage::{BlockId, FileManager};
use crate::transaction::BufferList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// A unit of work over blocks.
///
/// Every read takes a shared lock and every write an exclusive lock; all
/// locks are held until `commit` or `rollback`. Writes are undo-logged before
/// the page is touched. Any error from an operation means the caller should
/// roll the transaction back.
///
/// Dropping a transaction that is still active rolls it back.
pub struct Transaction {
    id: TransactionID,
    state: TransactionState,
    fm: Arc<FileManager>,
    bm: Arc<BufferManager>,
    recovery: RecoveryManager,
    concurrency: ConcurrencyManager,
    buffers: BufferList,
}

impl Transaction {
    pub fn new(
        id: TransactionID,
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        bm: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> Result<Self> {
        let recovery = RecoveryManager::new(id, lm, Arc::clone(&bm))?;

        Ok(Self {
            id,
            state: TransactionState::Active,
            fm,
            buffers: BufferList::new(Arc::clone(&bm)),
            bm,
            recovery,
            concurrency: ConcurrencyManager::new(id, lock_table),
        })
    }

    pub fn id(&self) -> TransactionID {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Makes the transaction's changes durable, then releases its locks and
    /// buffers.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.recovery.commit()?;
        self.state = TransactionState::Committed;
        self.concurrency.release();
        self.buffers.unpin_all()?;
        info!("transaction {} committed", self.id);
        Ok(())
    }

    /// Undoes the transaction's logged changes, then releases its locks and
    /// buffers.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.recovery.rollback()?;
        self.state = TransactionState::RolledBack;
        self.concurrency.release();
        self.buffers.unpin_all()?;
        info!("transaction {} rolled back", self.id);
        Ok(())
    }

    /// Crash recovery for the whole engine. Run once at startup, before any
    /// other transaction begins.
    pub fn recover(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.bm.flush_all(self.id)?;
        self.recovery.recover()
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.ensure_active()?;
        self.buffers.pin(block)
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.ensure_active()?;
        self.buffers.unpin(block)
    }

    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.ensure_active()?;
        self.concurrency.s_lock(block)?;
        let frame = self.buffers.get_or_pin(block)?;
        let value = frame.lock().contents().get_int(offset)?;
        Ok(value)
    }

    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.ensure_active()?;
        self.concurrency.s_lock(block)?;
        let frame = self.buffers.get_or_pin(block)?;
        let value = frame.lock().contents().get_string(offset)?;
        Ok(value)
    }

    /// Writes `value` at `offset`. With `ok_to_log` false the change is not
    /// undone by rollback or recovery; callers use that only for changes that
    /// are safe to lose, such as formatting a freshly appended block.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.ensure_active()?;
        self.concurrency.x_lock(block)?;
        let frame = self.buffers.get_or_pin(block)?;
        let mut frame = frame.lock();

        let lsn = if ok_to_log {
            Some(self.recovery.set_int(&frame, offset, value)?)
        } else {
            None
        };
        frame.contents_mut().set_int(offset, value)?;
        frame.set_modified(self.id, lsn);
        Ok(())
    }

    /// Like `set_int`. A logged write keeps the overwritten bytes in a single
    /// log record, which has to fit in one log block. Since log blocks are the
    /// same size as data blocks, a logged string must be somewhat shorter than
    /// the block. A longer one fails with `LogRecordTooLarge` and the page is
    /// left untouched.
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.ensure_active()?;
        self.concurrency.x_lock(block)?;
        let frame = self.buffers.get_or_pin(block)?;
        let mut frame = frame.lock();

        let lsn = if ok_to_log {
            Some(self.recovery.set_string(&frame, offset, value)?)
        } else {
            None
        };
        frame.contents_mut().set_string(offset, value)?;
        frame.set_modified(self.id, lsn);
        Ok(())
    }

    /// Number of blocks in `file_name`. Conflicts with concurrent appends.
    pub fn size(&mut self, file_name: &str) -> Result<i64> {
        self.ensure_active()?;
        self.concurrency.s_lock(&BlockId::end_of_file(file_name))?;
        self.fm.length(file_name)
    }

    pub fn append(&mut self, file_name: &str) -> Result<BlockId> {
        self.ensure_active()?;
        self.concurrency.x_lock(&BlockId::end_of_file(file_name))?;
        self.fm.append(file_name)
    }

    pub fn block_size(&self) -> usize {
        self.fm.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.bm.available()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(JadbError::TransactionNotActive(self.id));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            warn!("transaction {} dropped while active, rolling back", self.id);
            if let Err(e) = self.rollback() {
                warn!("rollback of dropped transaction {} failed: {}", self.id, e);
                self.concurrency.release();
                let _ = self.buffers.unpin_all();
            }
        }
    }
}
