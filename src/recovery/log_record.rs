use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferManager;
use crate::common::{JadbError, Result, TransactionID, LSN};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogRecordType {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
}

/// One entry of the undo log.
///
/// Update records carry the pre-image of the bytes they overwrite, so undo
/// restores the exact prior contents at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    Checkpoint,
    Start {
        txn_id: TransactionID,
    },
    Commit {
        txn_id: TransactionID,
    },
    Rollback {
        txn_id: TransactionID,
    },
    SetInt {
        txn_id: TransactionID,
        block: BlockId,
        offset: usize,
        old_value: i32,
    },
    SetString {
        txn_id: TransactionID,
        block: BlockId,
        offset: usize,
        old_bytes: Vec<u8>,
    },
}

impl LogRecord {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| JadbError::CorruptLog(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn write_to_log(&self, lm: &LogManager) -> Result<LSN> {
        lm.append(&self.to_bytes()?)
    }

    pub fn record_type(&self) -> LogRecordType {
        match self {
            LogRecord::Checkpoint => LogRecordType::Checkpoint,
            LogRecord::Start { .. } => LogRecordType::Start,
            LogRecord::Commit { .. } => LogRecordType::Commit,
            LogRecord::Rollback { .. } => LogRecordType::Rollback,
            LogRecord::SetInt { .. } => LogRecordType::SetInt,
            LogRecord::SetString { .. } => LogRecordType::SetString,
        }
    }

    /// Owning transaction; checkpoints belong to none.
    pub fn txn_id(&self) -> Option<TransactionID> {
        match self {
            LogRecord::Checkpoint => None,
            LogRecord::Start { txn_id }
            | LogRecord::Commit { txn_id }
            | LogRecord::Rollback { txn_id }
            | LogRecord::SetInt { txn_id, .. }
            | LogRecord::SetString { txn_id, .. } => Some(*txn_id),
        }
    }

    /// Restores the pre-image of an update record. The buffer is marked as
    /// modified by `undoing_txn` so that its flush covers the restored page.
    /// Non-update records are a no-op.
    pub fn undo(&self, bm: &BufferManager, undoing_txn: TransactionID) -> Result<()> {
        match self {
            LogRecord::SetInt {
                block,
                offset,
                old_value,
                ..
            } => restore(bm, block, undoing_txn, |page| page.set_int(*offset, *old_value)),
            LogRecord::SetString {
                block,
                offset,
                old_bytes,
                ..
            } => restore(bm, block, undoing_txn, |page| page.write_raw(*offset, old_bytes)),
            _ => Ok(()),
        }
    }
}

fn restore(
    bm: &BufferManager,
    block: &BlockId,
    undoing_txn: TransactionID,
    apply: impl FnOnce(&mut Page) -> Result<()>,
) -> Result<()> {
    let frame = bm.pin(block)?;
    let restored = {
        let mut frame = frame.lock();
        let result = apply(frame.contents_mut());
        if result.is_ok() {
            frame.set_modified(undoing_txn, None);
        }
        result
    };
    bm.unpin(&frame)?;
    restored
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Checkpoint => write!(f, "<CHECKPOINT>"),
            LogRecord::Start { txn_id } => write!(f, "<START {}>", txn_id),
            LogRecord::Commit { txn_id } => write!(f, "<COMMIT {}>", txn_id),
            LogRecord::Rollback { txn_id } => write!(f, "<ROLLBACK {}>", txn_id),
            LogRecord::SetInt {
                txn_id,
                block,
                offset,
                old_value,
            } => write!(f, "<SETINT {} {} {} {}>", txn_id, block, offset, old_value),
            LogRecord::SetString {
                txn_id,
                block,
                offset,
                old_bytes,
            } => write!(
                f,
                "<SETSTRING {} {} {} {} bytes>",
                txn_id,
                block,
                offset,
                old_bytes.len()
            ),
        }
    }
}
