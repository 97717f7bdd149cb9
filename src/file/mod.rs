//! Input sources and low-level byte handling.
//!
//! This module provides the [`File`] type, which gives uniform read-only access to the
//! bytes of an input archive or class file regardless of whether they come from a memory
//! map of a file on disk or from an owned buffer, plus the big-endian primitives the class
//! file codec is built on.
//!
//! # Key Components
//!
//! - [`File`] - Byte source backed by a memory map or an owned buffer
//! - [`parser::Parser`] - Bounds-checked big-endian cursor
//! - [`io`] - Big-endian read and write helpers for primitive types
//! - [`mutf8`] - The modified UTF-8 encoding used by class file constant pools
//!
//! # Examples
//!
//! ```rust,no_run
//! use classveil::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("app.jar"))?;
//! println!("{} bytes, zip: {}", file.len(), file.is_zip());
//! # Ok::<(), classveil::Error>(())
//! ```

pub mod io;
mod memory;
pub mod mutf8;
pub mod parser;
mod physical;

use std::path::Path;

use crate::Result;
use memory::Memory;
use physical::Physical;

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of the bytes, allowing for both in-memory and on-disk
/// representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A read-only byte source: a memory-mapped file or an owned buffer.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-maps the file at `file`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file can not be opened and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;
        Ok(File {
            data: Box::new(input),
        })
    }

    /// Wraps an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }
        Ok(File {
            data: Box::new(Memory::new(data)),
        })
    }

    /// Returns the total length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the source holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the complete content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the source.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Returns `true` if the content starts with a zip local file header.
    #[must_use]
    pub fn is_zip(&self) -> bool {
        self.data().starts_with(b"PK\x03\x04") || self.data().starts_with(b"PK\x05\x06")
    }

    /// Returns `true` if the content starts with the `0xCAFEBABE` class file magic.
    #[must_use]
    pub fn is_class(&self) -> bool {
        self.data().starts_with(&[0xCA, 0xFE, 0xBA, 0xBE])
    }
}
