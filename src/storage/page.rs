use crate::common::{JadbError, Result};

pub const INT_SIZE: usize = std::mem::size_of::<i32>();

/// Fixed-size byte buffer holding one block.
///
/// Ints are 4-byte big-endian. Byte arrays and strings are written as a
/// 4-byte length followed by the bytes; strings are UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Bytes needed to store a string of `len` bytes.
    pub fn max_length(len: usize) -> usize {
        INT_SIZE + len
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn get_int(&self, offset: usize) -> Result<i32> {
        let bytes = self.read_raw(offset, INT_SIZE)?;
        let mut buf = [0u8; INT_SIZE];
        buf.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(buf))
    }

    pub fn set_int(&mut self, offset: usize, value: i32) -> Result<()> {
        self.write_raw(offset, &value.to_be_bytes())
    }

    pub fn get_bytes(&self, offset: usize) -> Result<Vec<u8>> {
        let len = self.get_int(offset)?;
        if len < 0 {
            return Err(JadbError::PageOverflow {
                offset,
                len: 0,
                page_size: self.data.len(),
            });
        }
        Ok(self.read_raw(offset + INT_SIZE, len as usize)?.to_vec())
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        // Bounds check the whole write before touching the length prefix.
        self.check_bounds(offset, Self::max_length(bytes.len()))?;
        self.set_int(offset, bytes.len() as i32)?;
        self.write_raw(offset + INT_SIZE, bytes)
    }

    pub fn get_string(&self, offset: usize) -> Result<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes).map_err(|_| JadbError::InvalidString(offset))
    }

    pub fn set_string(&mut self, offset: usize, value: &str) -> Result<()> {
        self.set_bytes(offset, value.as_bytes())
    }

    pub fn read_raw(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check_bounds(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    pub fn write_raw(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_bounds(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(JadbError::PageOverflow {
                offset,
                len,
                page_size: self.data.len(),
            }),
        }
    }
}
