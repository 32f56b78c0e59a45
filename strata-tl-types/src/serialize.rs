//! The [`Serializable`] trait and its implementations for the TL primitives.
//!
//! Encoding follows [MTProto binary serialization]: little-endian integers,
//! length-prefixed byte strings padded to four bytes, and vectors prefixed by
//! their constructor id (boxed) or only their length (bare).
//!
//! [MTProto binary serialization]: https://core.telegram.org/mtproto/serialize

/// Constructor id of the boxed `Vector`.
pub const VECTOR_ID: u32 = 0x1cb5c415;
/// Constructor id of `boolTrue`.
pub const BOOL_TRUE_ID: u32 = 0x997275b5;
/// Constructor id of `boolFalse`.
pub const BOOL_FALSE_ID: u32 = 0xbc799737;

/// Serialize `self` into TL binary format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Serializes into a freshly allocated buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id = if *self { BOOL_TRUE_ID } else { BOOL_FALSE_ID };
        id.serialize(buf);
    }
}

macro_rules! le_bytes {
    ($($ty:ty),*) => {$(
        impl Serializable for $ty {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                buf.extend(self.to_le_bytes());
            }
        }
    )*};
}

le_bytes!(i32, u32, i64, f64);

impl<const N: usize> Serializable for [u8; N] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

/// Number of bytes `len` bytes of payload take once encoded as a TL string.
pub fn encoded_bytes_len(len: usize) -> usize {
    let header = if len <= 253 { 1 } else { 4 };
    (header + len).div_ceil(4) * 4
}

/// TL string encoding.
///
/// Up to 253 bytes: one length byte. Longer: `0xfe` and a 3-byte
/// little-endian length. Zero padding to a multiple of four follows the data.
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        let header_len = if len <= 253 {
            buf.extend([len as u8]);
            1
        } else {
            buf.extend([0xfe, len as u8, (len >> 8) as u8, (len >> 16) as u8]);
            4
        };
        buf.extend(self.iter().copied());
        let padding = encoded_bytes_len(len) - header_len - len;
        buf.extend(std::iter::repeat_n(0u8, padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

impl Serializable for &str {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

/// Boxed `Vector<T>`.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        VECTOR_ID.serialize(buf);
        (self.len() as i32).serialize(buf);
        self.iter().for_each(|item| item.serialize(buf));
    }
}

/// Bare `vector<T>`: the count and the items, no constructor id.
impl<T: Serializable> Serializable for crate::RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as i32).serialize(buf);
        self.0.iter().for_each(|item| item.serialize(buf));
    }
}

/// Flagged fields: `None` writes nothing, its absence lives in the flags word.
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(v) = self {
            v.serialize(buf);
        }
    }
}

impl Serializable for crate::Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}
