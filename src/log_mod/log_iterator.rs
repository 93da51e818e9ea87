use std::sync::Arc;

use crate::common::{JadbError, Result};
use crate::storage::{BlockId, FileManager, Page, INT_SIZE};

/// Walks the log backwards, from the newest record to the oldest.
///
/// Each item is the raw bytes of one record. The iterator is finite and
/// stops after the first error.
pub struct LogIterator {
    fm: Arc<FileManager>,
    block: BlockId,
    page: Page,
    current_pos: usize,
    done: bool,
}

impl LogIterator {
    pub(crate) fn new(fm: Arc<FileManager>, block: BlockId) -> Result<Self> {
        let page = Page::new(fm.block_size());
        let mut iter = Self {
            fm,
            block: block.clone(),
            page,
            current_pos: 0,
            done: false,
        };
        iter.move_to_block(block)?;
        Ok(iter)
    }

    fn move_to_block(&mut self, block: BlockId) -> Result<()> {
        self.fm.read(&block, &mut self.page)?;
        let boundary = self.page.get_int(0)?;
        if boundary < INT_SIZE as i32 || boundary as usize > self.page.size() {
            return Err(JadbError::CorruptLog(format!(
                "block {} has boundary {}",
                block, boundary
            )));
        }
        self.current_pos = boundary as usize;
        self.block = block;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        while self.current_pos >= self.page.size() {
            if self.block.number() <= 0 {
                return Ok(None);
            }
            let previous = BlockId::new(self.block.file_name(), self.block.number() - 1);
            self.move_to_block(previous)?;
        }

        let record = self.page.get_bytes(self.current_pos)?;
        self.current_pos += Page::max_length(record.len());
        Ok(Some(record))
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
