use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{JadbError, Result, LSN};
use crate::log_mod::LogIterator;
use crate::storage::{BlockId, FileManager, Page, INT_SIZE};

// Each log block starts with a boundary int: the offset of the most recently
// written record. Records fill the block from the end towards the front, so
// reading a block from the boundary forwards yields newest-first.

struct LogState {
    log_page: Page,
    current_block: BlockId,
    latest_lsn: u64,
    last_saved_lsn: u64,
}

/// Append-only record log. Appends are buffered in the current log block
/// until `flush` writes it out.
pub struct LogManager {
    fm: Arc<FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

impl LogManager {
    pub fn new(fm: Arc<FileManager>, log_file: &str) -> Result<Self> {
        let mut log_page = Page::new(fm.block_size());
        let log_size = fm.length(log_file)?;

        let current_block = if log_size == 0 {
            Self::append_new_block(&fm, log_file, &mut log_page)?
        } else {
            let block = BlockId::new(log_file, log_size - 1);
            fm.read(&block, &mut log_page)?;
            if log_page.get_int(0)? < INT_SIZE as i32 {
                // Appended but never formatted, so it holds no records
                warn!("formatting unfinished log block {}", block);
                log_page.set_int(0, fm.block_size() as i32)?;
                fm.write(&block, &log_page)?;
            }
            block
        };

        Ok(Self {
            fm,
            log_file: log_file.to_string(),
            state: Mutex::new(LogState {
                log_page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Appends a record and returns its LSN. The record is not durable until
    /// `flush` is called with this LSN or a later one.
    pub fn append(&self, record: &[u8]) -> Result<LSN> {
        let bytes_needed = Page::max_length(record.len());
        if bytes_needed + INT_SIZE > self.fm.block_size() {
            return Err(JadbError::LogRecordTooLarge(record.len()));
        }

        let mut state = self.state.lock();
        let mut boundary = state.log_page.get_int(0)? as usize;
        if boundary < bytes_needed + INT_SIZE {
            // Doesn't fit, move on to a fresh block
            self.flush_state(&mut state)?;
            let block = Self::append_new_block(&self.fm, &self.log_file, &mut state.log_page)?;
            state.current_block = block;
            boundary = state.log_page.get_int(0)? as usize;
        }

        let record_pos = boundary - bytes_needed;
        state.log_page.set_bytes(record_pos, record)?;
        state.log_page.set_int(0, record_pos as i32)?;
        state.latest_lsn += 1;

        Ok(LSN(state.latest_lsn))
    }

    /// Makes every record up to and including `lsn` durable.
    pub fn flush(&self, lsn: LSN) -> Result<()> {
        let mut state = self.state.lock();
        if lsn.0 > state.last_saved_lsn {
            self.flush_state(&mut state)?;
        }
        Ok(())
    }

    /// Flushes the log and returns an iterator over its records, newest first.
    pub fn iter(&self) -> Result<LogIterator> {
        let mut state = self.state.lock();
        self.flush_state(&mut state)?;
        LogIterator::new(Arc::clone(&self.fm), state.current_block.clone())
    }

    pub fn latest_lsn(&self) -> LSN {
        LSN(self.state.lock().latest_lsn)
    }

    pub fn last_saved_lsn(&self) -> LSN {
        LSN(self.state.lock().last_saved_lsn)
    }

    fn flush_state(&self, state: &mut LogState) -> Result<()> {
        self.fm.write(&state.current_block, &state.log_page)?;
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }

    fn append_new_block(fm: &FileManager, log_file: &str, log_page: &mut Page) -> Result<BlockId> {
        let block = fm.append(log_file)?;
        log_page.contents_mut().fill(0);
        log_page.set_int(0, fm.block_size() as i32)?;
        fm.write(&block, log_page)?;
        debug!("log moved to block {}", block);
        Ok(block)
    }
}
