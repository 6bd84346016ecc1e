//! Cursor over a method body's instruction bytes.
//!
//! [`Parser`] keeps a position into a borrowed byte slice and hands out bounds-checked
//! little-endian reads. The decoder drives it one instruction at a time and uses the
//! position as the instruction offset.

use crate::{
    stream::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A generic binary data parser for reading CIL instruction streams.
///
/// # Examples
///
/// ```rust
/// use dotinline::Parser;
///
/// let data = [0x1F, 0x2A, 0x20, 0x10, 0x27, 0x00, 0x00];
/// let mut parser = Parser::new(&data);
///
/// assert_eq!(parser.read_le::<u8>()?, 0x1F);
/// assert_eq!(parser.read_le::<i8>()?, 42);
/// parser.advance()?;
/// assert_eq!(parser.read_le::<i32>()?, 10_000);
/// assert!(!parser.has_more_data());
/// # Ok::<(), dotinline::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
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

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos >= self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skip one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if no byte remains.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if self.position + step > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position += step;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Peek at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(OutOfBounds);
        }
        Ok(self.data[self.position])
    }

    /// Read a little-endian value and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit in the remaining data.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_and_peek() {
        let data = [0x00, 0xFE, 0x01];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.len(), 3);
        parser.seek(1).unwrap();
        assert_eq!(parser.peek_byte().unwrap(), 0xFE);
        assert_eq!(parser.pos(), 1);
        assert!(parser.seek(3).is_err());
    }

    #[test]
    fn test_advance_past_end() {
        let data = [0x2A];
        let mut parser = Parser::new(&data);

        parser.advance().unwrap();
        assert!(!parser.has_more_data());
        assert_eq!(parser.advance(), Err(OutOfBounds));
        assert_eq!(parser.read_le::<u8>(), Err(OutOfBounds));
    }
}
