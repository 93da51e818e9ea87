use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{BufferFrame, BufferManager};
use crate::common::{JadbError, Result};
use crate::storage::BlockId;

struct PinnedBuffer {
    frame: Arc<Mutex<BufferFrame>>,
    pins: usize,
}

/// Buffers pinned by one transaction.
///
/// Repeated pins of a block are counted here; the buffer manager sees a
/// single pin per block.
pub struct BufferList {
    bm: Arc<BufferManager>,
    buffers: HashMap<BlockId, PinnedBuffer>,
}

impl BufferList {
    pub fn new(bm: Arc<BufferManager>) -> Self {
        Self {
            bm,
            buffers: HashMap::new(),
        }
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        if let Some(pinned) = self.buffers.get_mut(block) {
            pinned.pins += 1;
            return Ok(());
        }
        let frame = self.bm.pin(block)?;
        self.buffers
            .insert(block.clone(), PinnedBuffer { frame, pins: 1 });
        Ok(())
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        let pinned = self
            .buffers
            .get_mut(block)
            .ok_or_else(|| JadbError::BlockNotPinned(block.clone()))?;
        pinned.pins -= 1;
        if pinned.pins == 0 {
            if let Some(pinned) = self.buffers.remove(block) {
                self.bm.unpin(&pinned.frame)?;
            }
        }
        Ok(())
    }

    pub fn get_buffer(&self, block: &BlockId) -> Option<Arc<Mutex<BufferFrame>>> {
        self.buffers.get(block).map(|pinned| Arc::clone(&pinned.frame))
    }

    /// Returns the buffer for `block`, pinning it first if this transaction
    /// does not hold it yet.
    pub fn get_or_pin(&mut self, block: &BlockId) -> Result<Arc<Mutex<BufferFrame>>> {
        if !self.buffers.contains_key(block) {
            self.pin(block)?;
        }
        self.get_buffer(block)
            .ok_or_else(|| JadbError::BlockNotPinned(block.clone()))
    }

    pub fn pin_count(&self, block: &BlockId) -> usize {
        self.buffers.get(block).map_or(0, |pinned| pinned.pins)
    }

    /// Releases every pin. All buffers are attempted; the first error is
    /// returned.
    pub fn unpin_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, pinned) in self.buffers.drain() {
            if let Err(e) = self.bm.unpin(&pinned.frame) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
