use arrayvec::ArrayVec;
use core::ops::Deref;
use snafu::ensure;

use crate::types::{BufferOverflowSnafu, Error};
use crate::MAX_DATA_LEN;

/// Fixed-capacity byte buffer. Writes that don't fit are rejected as a
/// whole, the buffer never holds a truncated write.
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer<const N: usize> {
    data: ArrayVec<u8, N>,
}

/// Storage for the data field of a single frame.
pub type Payload = Buffer<MAX_DATA_LEN>;

impl<const N: usize> Buffer<N> {
    pub const fn new() -> Self {
        Self {
            data: ArrayVec::new_const(),
        }
    }

    /// Create a buffer holding a copy of `bytes`.
    /// # Errors
    /// Returns [`Error::BufferOverflow`] if `bytes` doesn't fit.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let mut buf = Self::new();
        buf.write(bytes)?;
        Ok(buf)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Append one byte.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.data
            .try_push(byte)
            .map_err(|_| Error::BufferOverflow { capacity: N })
    }

    /// Append all of `bytes`, or nothing if they don't fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        ensure!(
            bytes.len() <= self.data.remaining_capacity(),
            BufferOverflowSnafu { capacity: N }
        );
        self.data
            .try_extend_from_slice(bytes)
            .map_err(|_| Error::BufferOverflow { capacity: N })
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for Buffer<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const N: usize> AsRef<[u8]> for Buffer<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const N: usize> core::fmt::Debug for Buffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_buffer() -> Buffer<8> {
        let mut buf = Buffer::new();
        buf.write(b"abcd").unwrap();
        buf
    }

    #[test]
    fn test_write_fails_closed() {
        let mut buf = get_buffer();
        assert_eq!(
            buf.write(b"efghi"),
            Err(Error::BufferOverflow { capacity: 8 })
        );
        // nothing of the rejected write was stored
        assert_eq!(buf.as_slice(), b"abcd");
        buf.write(b"efgh").unwrap();
        assert_eq!(buf.len(), buf.capacity());
        assert!(buf.push(b'x').is_err());
        assert_eq!(&*buf, b"abcdefgh");
    }

    #[test]
    fn test_clear() {
        let mut buf = get_buffer();
        buf.clear();
        assert!(buf.is_empty());
        assert!(Payload::from_slice(&[0; MAX_DATA_LEN + 1]).is_err());
        assert_eq!(Payload::from_slice(&[1, 2, 3]).unwrap().len(), 3);
    }
}
