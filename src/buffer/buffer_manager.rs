use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::{JadbError, Result, TransactionID, LSN};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, FileManager, Page};

/// One slot of the buffer pool.
///
/// The page, its block assignment and the (modifying transaction, LSN) pair
/// sit behind the frame's mutex and are only changed together. Pin counts are
/// kept by the pool.
pub struct BufferFrame {
    page: Page,
    block: Option<BlockId>,
    modified_by: Option<TransactionID>,
    lsn: Option<LSN>,
}

impl BufferFrame {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: Page::new(page_size),
            block: None,
            modified_by: None,
            lsn: None,
        }
    }

    pub fn contents(&self) -> &Page {
        &self.page
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// Records that `txn_id` changed the page. `lsn` is the log record that
    /// describes the change; unlogged changes keep the previous LSN.
    pub fn set_modified(&mut self, txn_id: TransactionID, lsn: Option<LSN>) {
        self.modified_by = Some(txn_id);
        if lsn.is_some() {
            self.lsn = lsn;
        }
    }

    pub fn modifying_txn(&self) -> Option<TransactionID> {
        self.modified_by
    }

    pub fn is_dirty(&self) -> bool {
        self.modified_by.is_some()
    }

    pub fn lsn(&self) -> Option<LSN> {
        self.lsn
    }
}

struct PoolState {
    resident: HashMap<BlockId, usize>,
    pins: Vec<u32>, // Can't evict while > 0
    clock_hand: usize,
    num_available: usize,
}

impl PoolState {
    fn pin(&mut self, index: usize) {
        if self.pins[index] == 0 {
            self.num_available -= 1;
        }
        self.pins[index] += 1;
    }

    // True when the frame became unpinned.
    fn unpin(&mut self, index: usize) -> bool {
        self.pins[index] -= 1;
        if self.pins[index] == 0 {
            self.num_available += 1;
            return true;
        }
        false
    }
}

/// Fixed-size pool of page buffers shared by every transaction.
///
/// The pool mutex only guards bookkeeping. Disk reads and write-backs happen
/// with just the frame's mutex held, on a frame the pool has reserved by
/// pinning it. While the pool mutex is held, frame mutexes are only ever
/// `try_lock`ed.
pub struct BufferManager {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    frames: Vec<Arc<Mutex<BufferFrame>>>,
    pool: Mutex<PoolState>,
    frame_released: Condvar,
    max_wait: Duration,
    shutting_down: AtomicBool,
}

impl BufferManager {
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        capacity: usize,
        max_wait: Duration,
    ) -> Self {
        let frames = (0..capacity)
            .map(|_| Arc::new(Mutex::new(BufferFrame::new(fm.block_size()))))
            .collect();

        Self {
            fm,
            lm,
            frames,
            pool: Mutex::new(PoolState {
                resident: HashMap::with_capacity(capacity),
                pins: vec![0; capacity],
                clock_hand: 0,
                num_available: capacity,
            }),
            frame_released: Condvar::new(),
            max_wait,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Pins a buffer holding `block`, reading it from disk if needed.
    ///
    /// Waits up to the configured bound for a frame to be unpinned, then
    /// fails with `NoAvailableBuffers`.
    pub fn pin(&self, block: &BlockId) -> Result<Arc<Mutex<BufferFrame>>> {
        let deadline = Instant::now() + self.max_wait;
        let mut pool = self.pool.lock();

        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                return Err(JadbError::ShuttingDown);
            }
            if let Some(index) = pool.resident.get(block).copied() {
                pool.pin(index);
                return Ok(Arc::clone(&self.frames[index]));
            }

            if let Some((index, mut frame)) = self.choose_unpinned(&mut pool) {
                pool.pin(index);

                if frame.is_dirty() {
                    // The old block stays resident until it is written back
                    let flushed =
                        MutexGuard::unlocked(&mut pool, || self.flush_frame(&mut frame));
                    drop(frame);
                    self.release(&mut pool, index);
                    flushed?;
                    continue;
                }

                if let Some(old) = frame.block.take() {
                    debug!("evicting {} to make room for {}", old, block);
                    pool.resident.remove(&old);
                }
                let read =
                    MutexGuard::unlocked(&mut pool, || self.fm.read(block, &mut frame.page));
                if let Err(e) = read {
                    drop(frame);
                    self.release(&mut pool, index);
                    return Err(e);
                }

                if let Some(loaded) = pool.resident.get(block).copied() {
                    // Another thread read the same block in the meantime
                    drop(frame);
                    self.release(&mut pool, index);
                    pool.pin(loaded);
                    return Ok(Arc::clone(&self.frames[loaded]));
                }
                frame.block = Some(block.clone());
                pool.resident.insert(block.clone(), index);
                return Ok(Arc::clone(&self.frames[index]));
            }

            if Instant::now() >= deadline {
                warn!("gave up waiting for a buffer for {}", block);
                return Err(JadbError::NoAvailableBuffers);
            }
            self.frame_released.wait_until(&mut pool, deadline);
        }
    }

    pub fn unpin(&self, frame: &Arc<Mutex<BufferFrame>>) -> Result<()> {
        let index = self
            .frames
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, frame))
            .ok_or(JadbError::BufferNotPinned)?;

        let mut pool = self.pool.lock();
        if pool.pins[index] == 0 {
            return Err(JadbError::BufferNotPinned);
        }
        self.release(&mut pool, index);
        Ok(())
    }

    /// Writes out every buffer last modified by `txn_id`.
    pub fn flush_all(&self, txn_id: TransactionID) -> Result<()> {
        for frame in &self.frames {
            let mut frame = frame.lock();
            if frame.modifying_txn() == Some(txn_id) {
                self.flush_frame(&mut frame)?;
            }
        }

        // Frames that were busy here may have been skipped by a waiting pin
        let _pool = self.pool.lock();
        self.frame_released.notify_all();
        Ok(())
    }

    /// Number of unpinned buffers.
    pub fn available(&self) -> usize {
        self.pool.lock().num_available
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Pins currently held on `block`; zero when it is not resident.
    pub fn pin_count(&self, block: &BlockId) -> u32 {
        let pool = self.pool.lock();
        pool.resident.get(block).map_or(0, |&index| pool.pins[index])
    }

    /// Fails every current and future `pin` with `ShuttingDown`.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let _pool = self.pool.lock();
        self.frame_released.notify_all();
    }

    fn release(&self, pool: &mut PoolState, index: usize) {
        if pool.unpin(index) {
            self.frame_released.notify_all();
        }
    }

    // Clock scan from the hand. Unassigned or clean frames win outright; the
    // first dirty unpinned frame is the fallback. A frame whose mutex is taken
    // is busy elsewhere and skipped.
    fn choose_unpinned(
        &self,
        pool: &mut PoolState,
    ) -> Option<(usize, MutexGuard<'_, BufferFrame>)> {
        let frame_count = self.frames.len();
        let mut dirty_victim = None;

        for step in 0..frame_count {
            let index = (pool.clock_hand + step) % frame_count;
            if pool.pins[index] > 0 {
                continue;
            }
            let Some(frame) = self.frames[index].try_lock() else {
                continue;
            };
            if frame.block().is_none() || !frame.is_dirty() {
                pool.clock_hand = (index + 1) % frame_count;
                return Some((index, frame));
            }
            if dirty_victim.is_none() {
                dirty_victim = Some((index, frame));
            }
        }

        if let Some((index, _)) = &dirty_victim {
            pool.clock_hand = (index + 1) % frame_count;
        }
        dirty_victim
    }

    // Write-ahead: the log is flushed up to the frame's LSN before the page.
    fn flush_frame(&self, frame: &mut BufferFrame) -> Result<()> {
        if frame.modified_by.is_none() {
            return Ok(());
        }
        if let Some(block) = &frame.block {
            if let Some(lsn) = frame.lsn {
                self.lm.flush(lsn)?;
            }
            self.fm.write(block, &frame.page)?;
            debug!("flushed {}", block);
        }
        frame.modified_by = None;
        frame.lsn = None;
        Ok(())
    }
}
