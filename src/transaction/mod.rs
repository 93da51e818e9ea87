mod buffer_list;
mod transaction;
mod transaction_manager;

pub use buffer_list::BufferList;
pub use transaction::{Transaction, TransactionState};
pub use transaction_manager::TransactionManager;
