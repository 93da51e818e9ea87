#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jadb::{BufferManager, Database, DatabaseConfig, FileManager, LogManager, Result};
use tempfile::TempDir;

pub const BLOCK_SIZE: usize = 400;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config() -> DatabaseConfig {
    DatabaseConfig {
        block_size: BLOCK_SIZE,
        buffer_pool_size: 8,
        buffer_max_wait: Duration::from_millis(500),
        lock_max_wait: Duration::from_secs(2),
        ..DatabaseConfig::default()
    }
}

// The database lives in a subdirectory so that it starts out new
pub fn open_test_db(config: DatabaseConfig) -> Result<(Database, TempDir)> {
    init_logging();
    let dir = TempDir::new()?;
    let db = Database::open(&dir.path().join("db"), config)?;
    Ok((db, dir))
}

pub struct Services {
    pub fm: Arc<FileManager>,
    pub lm: Arc<LogManager>,
    pub bm: Arc<BufferManager>,
    pub dir: TempDir,
}

pub fn create_services(pool_size: usize, max_wait: Duration) -> Result<Services> {
    init_logging();
    let dir = TempDir::new()?;
    let fm = Arc::new(FileManager::new(dir.path(), BLOCK_SIZE)?);
    let lm = Arc::new(LogManager::new(Arc::clone(&fm), "test.log")?);
    let bm = Arc::new(BufferManager::new(
        Arc::clone(&fm),
        Arc::clone(&lm),
        pool_size,
        max_wait,
    ));
    Ok(Services { fm, lm, bm, dir })
}
