use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one fixed-size block: a file name and a block number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId {
    file_name: String,
    number: i64,
}

impl BlockId {
    /// Block number of the whole-file sentinel. Locking it serializes
    /// `size` and `append` on that file.
    pub const END_OF_FILE: i64 = -1;

    pub fn new(file_name: impl Into<String>, number: i64) -> Self {
        Self {
            file_name: file_name.into(),
            number,
        }
    }

    pub fn end_of_file(file_name: impl Into<String>) -> Self {
        Self::new(file_name, Self::END_OF_FILE)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn is_end_of_file(&self) -> bool {
        self.number == Self::END_OF_FILE
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.file_name, self.number)
    }
}
