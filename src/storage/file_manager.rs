use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;

use crate::common::{JadbError, Result};
use crate::storage::{BlockId, Page};

/// Block-addressed access to the files of one database directory.
pub struct FileManager {
    db_directory: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<HashMap<String, File>>,
}

impl FileManager {
    pub fn new(db_directory: &Path, block_size: usize) -> Result<Self> {
        let is_new = !db_directory.exists();
        fs::create_dir_all(db_directory)?;

        Ok(Self {
            db_directory: db_directory.to_path_buf(),
            block_size,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    /// Reads `block` into `page`. Bytes past the end of the file read as zero.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> Result<()> {
        let offset = self.offset_of(block)?;
        let mut files = self.open_files.lock();
        let file = self.open_file(&mut files, block.file_name())?;
        file.seek(SeekFrom::Start(offset))?;

        let buffer = page.contents_mut();
        let mut filled = 0;
        while filled < buffer.len() {
            let n = file.read(&mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buffer[filled..].fill(0);
        Ok(())
    }

    pub fn write(&self, block: &BlockId, page: &Page) -> Result<()> {
        let offset = self.offset_of(block)?;
        let mut files = self.open_files.lock();
        let file = self.open_file(&mut files, block.file_name())?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.contents())?;
        file.sync_data()?; // Force to disk
        Ok(())
    }

    /// Extends `file_name` by one zeroed block and returns its id.
    pub fn append(&self, file_name: &str) -> Result<BlockId> {
        let mut files = self.open_files.lock();
        let file = self.open_file(&mut files, file_name)?;
        let number = (file.metadata()?.len() / self.block_size as u64) as i64;
        let block = BlockId::new(file_name, number);

        file.seek(SeekFrom::Start(number as u64 * self.block_size as u64))?;
        file.write_all(&vec![0u8; self.block_size])?;
        file.sync_data()?;
        debug!("appended block {}", block);
        Ok(block)
    }

    /// Number of blocks in `file_name`.
    pub fn length(&self, file_name: &str) -> Result<i64> {
        let mut files = self.open_files.lock();
        let file = self.open_file(&mut files, file_name)?;
        Ok((file.metadata()?.len() / self.block_size as u64) as i64)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn db_directory(&self) -> &Path {
        &self.db_directory
    }

    fn offset_of(&self, block: &BlockId) -> Result<u64> {
        if block.number() < 0 {
            return Err(JadbError::InvalidBlock(block.clone()));
        }
        Ok(block.number() as u64 * self.block_size as u64)
    }

    fn open_file<'a>(
        &self,
        files: &'a mut HashMap<String, File>,
        file_name: &str,
    ) -> Result<&'a mut File> {
        match files.entry(file_name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(self.db_directory.join(file_name))?;
                Ok(entry.insert(file))
            }
        }
    }
}
