use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::buffer::{BufferFrame, BufferManager};
use crate::common::{JadbError, Result, TransactionID, LSN};
use crate::log_mod::LogManager;
use crate::recovery::LogRecord;
use crate::storage::{BlockId, Page};

/// Undo logging for one transaction, plus rollback and crash recovery.
///
/// Committed changes are forced to disk at commit, so recovery only ever
/// has to undo the updates of transactions that never finished.
pub struct RecoveryManager {
    txn_id: TransactionID,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
}

impl RecoveryManager {
    /// Writes the transaction's START record.
    pub fn new(txn_id: TransactionID, lm: Arc<LogManager>, bm: Arc<BufferManager>) -> Result<Self> {
        LogRecord::Start { txn_id }.write_to_log(&lm)?;
        Ok(Self { txn_id, lm, bm })
    }

    /// Logs the current int at `offset` before it is overwritten.
    pub fn set_int(&self, frame: &BufferFrame, offset: usize, _new_value: i32) -> Result<LSN> {
        let old_value = frame.contents().get_int(offset)?;
        let record = LogRecord::SetInt {
            txn_id: self.txn_id,
            block: assigned_block(frame)?,
            offset,
            old_value,
        };
        record.write_to_log(&self.lm)
    }

    /// Logs the bytes that writing `new_value` at `offset` will overwrite.
    pub fn set_string(&self, frame: &BufferFrame, offset: usize, new_value: &str) -> Result<LSN> {
        let old_bytes = frame
            .contents()
            .read_raw(offset, Page::max_length(new_value.len()))?
            .to_vec();
        let record = LogRecord::SetString {
            txn_id: self.txn_id,
            block: assigned_block(frame)?,
            offset,
            old_bytes,
        };
        record.write_to_log(&self.lm)
    }

    pub fn commit(&self) -> Result<()> {
        let lsn = LogRecord::Commit { txn_id: self.txn_id }.write_to_log(&self.lm)?;
        self.lm.flush(lsn)?;
        self.bm.flush_all(self.txn_id)
    }

    pub fn rollback(&self) -> Result<()> {
        self.do_rollback()?;
        self.bm.flush_all(self.txn_id)?;
        let lsn = LogRecord::Rollback { txn_id: self.txn_id }.write_to_log(&self.lm)?;
        self.lm.flush(lsn)
    }

    /// Undoes every update of unfinished transactions, then writes a
    /// checkpoint so the next recovery can stop there.
    pub fn recover(&self) -> Result<()> {
        let undone = self.do_recover()?;
        self.bm.flush_all(self.txn_id)?;
        let lsn = LogRecord::Checkpoint.write_to_log(&self.lm)?;
        self.lm.flush(lsn)?;
        info!("recovery undid {} update(s)", undone);
        Ok(())
    }

    fn records(&self) -> Result<impl Iterator<Item = Result<LogRecord>>> {
        Ok(self
            .lm
            .iter()?
            .map(|bytes| bytes.and_then(|bytes| LogRecord::from_bytes(&bytes))))
    }

    fn do_rollback(&self) -> Result<()> {
        for record in self.records()? {
            let record = record?;
            if record.txn_id() != Some(self.txn_id) {
                continue;
            }
            if let LogRecord::Start { .. } = record {
                return Ok(());
            }
            debug!("rolling back {}", record);
            record.undo(&self.bm, self.txn_id)?;
        }
        Ok(())
    }

    fn do_recover(&self) -> Result<usize> {
        let mut finished = HashSet::new();
        let mut undone = 0;

        for record in self.records()? {
            let record = record?;
            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { txn_id } | LogRecord::Rollback { txn_id } => {
                    finished.insert(*txn_id);
                }
                LogRecord::SetInt { txn_id, .. } | LogRecord::SetString { txn_id, .. }
                    if !finished.contains(txn_id) =>
                {
                    debug!("recovery undoing {}", record);
                    record.undo(&self.bm, self.txn_id)?;
                    undone += 1;
                }
                _ => {}
            }
        }
        Ok(undone)
    }
}

fn assigned_block(frame: &BufferFrame) -> Result<BlockId> {
    frame
        .block()
        .cloned()
        .ok_or(JadbError::UnassignedBuffer)
}
