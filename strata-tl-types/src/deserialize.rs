//! The [`Deserializable`] trait, the [`Cursor`] it reads from, and the
//! primitive implementations.

use std::fmt;

use crate::serialize::{BOOL_FALSE_ID, BOOL_TRUE_ID, VECTOR_ID};

/// Errors that can occur during deserialization.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Ran out of bytes before the value was fully read.
    UnexpectedEof,
    /// Read a constructor id that is not valid at this position.
    UnexpectedConstructor {
        /// The id that was read.
        id: u32,
    },
    /// A vector count that is negative or larger than the remaining input.
    InvalidLength {
        /// The count as read from the wire.
        len: i64,
    },
    /// A `string` that is not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::UnexpectedConstructor { id } => {
                write!(f, "unexpected constructor id: {id:#010x}")
            }
            Self::InvalidLength { len } => write!(f, "invalid vector length: {len}"),
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for deserialization.
pub type Result<T> = std::result::Result<T, Error>;

/// A zero-copy reader over an in-memory byte slice.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// A cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(Error::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    /// Borrows the next `len` bytes and advances past them.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error::UnexpectedEof)?;
        let slice = self.buf.get(self.pos..end).ok_or(Error::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.read_slice(out.len())?);
        Ok(())
    }

    /// Reads the next constructor id without consuming it.
    pub fn peek_u32(&self) -> Result<u32> {
        let b = self.buf.get(self.pos..self.pos + 4).ok_or(Error::UnexpectedEof)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Everything not read yet. Does not advance.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Consumes all remaining bytes into `out`, returning how many.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> usize {
        let rest = self.rest();
        out.extend_from_slice(rest);
        self.pos = self.buf.len();
        rest.len()
    }
}

/// Alias used by generated code.
pub type Buffer<'a, 'b> = &'a mut Cursor<'b>;

/// Deserialize a value from TL binary format.
pub trait Deserializable: Sized {
    /// Reads `Self` from `buf`, advancing it.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Deserializes from the start of a byte slice. Trailing bytes are ignored.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::from_slice(bytes);
        Self::deserialize(&mut cursor)
    }
}

impl Deserializable for bool {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            BOOL_TRUE_ID => Ok(true),
            BOOL_FALSE_ID => Ok(false),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

macro_rules! le_bytes {
    ($($ty:ty),*) => {$(
        impl Deserializable for $ty {
            fn deserialize(buf: Buffer) -> Result<Self> {
                let mut b = [0u8; std::mem::size_of::<$ty>()];
                buf.read_exact(&mut b)?;
                Ok(<$ty>::from_le_bytes(b))
            }
        }
    )*};
}

le_bytes!(i32, u32, i64, f64);

impl<const N: usize> Deserializable for [u8; N] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; N];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

/// Reads a TL byte string without copying it.
pub fn read_bytes<'a>(buf: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let first = buf.read_byte()?;
    let (len, header) = if first == 0xfe {
        let b = buf.read_slice(3)?;
        (usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16, 4)
    } else {
        (usize::from(first), 1)
    };
    let data = buf.read_slice(len)?;
    buf.read_slice((4 - (header + len) % 4) % 4)?;
    Ok(data)
}

impl Deserializable for Vec<u8> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        read_bytes(buf).map(<[u8]>::to_vec)
    }
}

impl Deserializable for String {
    fn deserialize(buf: Buffer) -> Result<Self> {
        String::from_utf8(Vec::<u8>::deserialize(buf)?).map_err(|_| Error::InvalidUtf8)
    }
}

fn read_count(buf: Buffer) -> Result<usize> {
    let len = i32::deserialize(buf)?;
    // Every item takes at least four bytes on the wire.
    match usize::try_from(len) {
        Ok(n) if n <= buf.remaining() / 4 => Ok(n),
        _ => Err(Error::InvalidLength { len: i64::from(len) }),
    }
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        if id != VECTOR_ID {
            return Err(Error::UnexpectedConstructor { id });
        }
        let len = read_count(buf)?;
        (0..len).map(|_| T::deserialize(buf)).collect()
    }
}

impl<T: Deserializable> Deserializable for crate::RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = read_count(buf)?;
        (0..len).map(|_| T::deserialize(buf)).collect::<Result<_>>().map(crate::RawVec)
    }
}

/// Takes the rest of the buffer verbatim.
impl Deserializable for crate::Blob {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = Vec::new();
        buf.read_to_end(&mut out);
        Ok(crate::Blob(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_bytes_skip_padding() {
        // len 5, "hello", 2 bytes padding, then an i32
        let mut raw = vec![5, b'h', b'e', b'l', b'l', b'o', 0, 0];
        raw.extend(7i32.to_le_bytes());
        let mut cursor = Cursor::from_slice(&raw);
        assert_eq!(read_bytes(&mut cursor).unwrap(), b"hello");
        assert_eq!(i32::deserialize(&mut cursor).unwrap(), 7);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn peek_does_not_advance() {
        let raw = VECTOR_ID.to_le_bytes();
        let cursor = Cursor::from_slice(&raw);
        assert_eq!(cursor.peek_u32().unwrap(), VECTOR_ID);
        assert_eq!(cursor.pos(), 0);
    }
}
