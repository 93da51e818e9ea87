mod concurrency_manager;
mod lock_table;

pub use concurrency_manager::ConcurrencyManager;
pub use lock_table::{LockMode, LockTable};
