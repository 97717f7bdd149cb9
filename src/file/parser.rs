//! Low-level byte stream parser for class file decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser for reading class file structures and bytecode. Every read is bounds-checked and
//! big-endian, as the class file format mandates.
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::advance_by`] - Move forward by specified bytes
//! - [`crate::file::parser::Parser::pos`] - Get current position
//! - [`crate::file::parser::Parser::align`] - Align to byte boundaries (switch padding)
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_be`] - Read primitive types
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a run of bytes
//! - [`crate::file::parser::Parser::read_mutf8`] - Read a length-prefixed modified UTF-8 string
//!
//! # Usage Examples
//!
//! ```rust
//! use classveil::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFEBABE);
//! assert_eq!(parser.read_be::<u16>()?, 0);
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! assert!(!parser.has_more_data());
//! # Ok::<(), classveil::Error>(())
//! ```

use crate::{
    file::{
        io::{read_be_at, ClassIO},
        mutf8,
    },
    Result,
};

/// A generic binary data parser for reading class file structures.
///
/// `Parser` maintains an internal position cursor and provides bounds checking
/// to prevent buffer overruns when reading malformed or truncated data.
#[derive(Clone)]
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use classveil::Parser;
    /// let data = [0x01, 0x02, 0x03, 0x04];
    /// let parser = Parser::new(&data);
    /// assert_eq!(parser.len(), 4);
    /// ```
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the data is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Skips forward to the next multiple of `alignment`, as `tableswitch` and
    /// `lookupswitch` require relative to the start of the code array.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let rem = self.position % alignment;
        if rem != 0 {
            self.advance_by(alignment - rem)?;
        }
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get the bytes that have not been consumed yet.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    /// Peek at the current byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Read a big-endian value of type `T` and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a `u16` length followed by that many bytes of modified UTF-8.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and [`crate::Error::Malformed`]
    /// for invalid encodings.
    pub fn read_mutf8(&mut self) -> Result<String> {
        let len = self.read_be::<u16>()?;
        let bytes = self.read_bytes(usize::from(len))?;
        mutf8::decode(bytes)
    }

    /// Run `f` on a sub-parser restricted to the next `len` bytes, then advance past them.
    ///
    /// The sub-parser can not read beyond its window, which keeps a malformed attribute
    /// from consuming bytes of the following structure.
    ///
    /// # Errors
    /// Propagates errors from `f`, and returns [`crate::Error::OutOfBounds`] if the window
    /// exceeds the data.
    pub fn sub<T>(&mut self, len: usize, f: impl FnOnce(&mut Parser<'a>) -> Result<T>) -> Result<T> {
        let window = self.read_bytes(len)?;
        let mut sub = Parser::new(window);
        f(&mut sub)
    }
}
