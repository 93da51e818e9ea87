mod block_id;
mod file_manager;
mod page;

pub use block_id::BlockId;
pub use file_manager::FileManager;
pub use page::{Page, INT_SIZE};
