use thiserror::Error;

use crate::common::TransactionID;
use crate::storage::BlockId;

#[derive(Debug, Error)]
pub enum JadbError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("No buffer became available in time")]
    NoAvailableBuffers,

    #[error("Lock wait on {0} timed out, transaction must roll back")]
    LockAbort(BlockId),

    #[error("Corrupt log record: {0}")]
    CorruptLog(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Access of {len} bytes at offset {offset} overflows page of size {page_size}")]
    PageOverflow {
        offset: usize,
        len: usize,
        page_size: usize,
    },

    #[error("Bytes at offset {0} are not a valid string")]
    InvalidString(usize),

    #[error("Log record of {0} bytes does not fit in a log block")]
    LogRecordTooLarge(usize),

    #[error("Block {0} is not pinned by this transaction")]
    BlockNotPinned(BlockId),

    #[error("Transaction {0} is no longer active")]
    TransactionNotActive(TransactionID),

    #[error("Buffer is not pinned")]
    BufferNotPinned,

    #[error("Buffer is not assigned to a block")]
    UnassignedBuffer,

    #[error("Block {0} does not address data")]
    InvalidBlock(BlockId),

    #[error("Buffer pool is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, JadbError>;
