pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod log_mod;
pub mod recovery;
pub mod storage;
pub mod transaction;

pub use buffer::BufferManager;
pub use common::{DatabaseConfig, JadbError, Result, TransactionID, LSN};
pub use concurrency::LockTable;
pub use log_mod::LogManager;
pub use storage::{BlockId, FileManager, Page};
pub use transaction::{Transaction, TransactionManager};

use log::info;
use std::path::Path;
use std::sync::Arc;

/// The transactional storage engine for one database directory.
pub struct Database {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    transaction_manager: TransactionManager,
}

impl Database {
    /// Opens (or creates) the database in `db_path`. An existing database is
    /// recovered before this returns.
    pub fn open(db_path: &Path, config: DatabaseConfig) -> Result<Self> {
        let fm = Arc::new(FileManager::new(db_path, config.block_size)?);
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), &config.log_file)?);
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            config.buffer_pool_size,
            config.buffer_max_wait,
        ));
        let lock_table = Arc::new(LockTable::new(config.lock_max_wait));
        let transaction_manager =
            TransactionManager::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), lock_table);

        let db = Self {
            fm,
            lm,
            bm,
            transaction_manager,
        };

        if db.fm.is_new() {
            info!("creating new database at {}", db_path.display());
        } else {
            info!("recovering existing database at {}", db_path.display());
            let mut txn = db.new_transaction()?;
            txn.recover()?;
            txn.commit()?;
        }

        Ok(db)
    }

    pub fn new_transaction(&self) -> Result<Transaction> {
        self.transaction_manager.begin()
    }

    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.fm
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.lm
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.bm
    }

    /// Stops handing out buffers; waiting and future pins fail.
    pub fn shutdown(&self) {
        self.bm.shutdown();
    }
}
