use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// An owned in-memory buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory() {
        let mut data = vec![0xCC_u8; 64];
        data[10] = 0xBB;
        data[11] = 0xBB;

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 64);
        assert_eq!(memory.data_slice(10, 2).unwrap(), &[0xBB, 0xBB]);
        assert!(memory.data_slice(63, 2).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }
}
