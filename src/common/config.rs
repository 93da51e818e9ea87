use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub block_size: usize,
    pub buffer_pool_size: usize,
    pub log_file: String,
    /// How long `pin` waits for a frame before giving up.
    pub buffer_max_wait: Duration,
    /// How long a lock request waits before the transaction is aborted.
    pub lock_max_wait: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            buffer_pool_size: 1000,
            log_file: "jadb.log".to_string(),
            buffer_max_wait: Duration::from_secs(10),
            lock_max_wait: Duration::from_secs(10),
        }
    }
}
