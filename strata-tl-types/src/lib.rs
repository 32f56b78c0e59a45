//! Generated MTProto types, functions and enums, plus the binary codec they
//! are written in.
//!
//! The build script generates the modules from the schemas in `tl/`:
//!
//! | Module        | Contents                                                |
//! |---------------|---------------------------------------------------------|
//! | [`types`]     | One `struct` per constructor                            |
//! | [`functions`] | One `struct` per RPC function, implementing [`RemoteCall`] |
//! | [`enums`]     | One `enum` per boxed type, one variant per constructor  |
//!
//! `tl-mtproto` selects the service schema (key exchange, acks, salts),
//! `tl-api` the application excerpt.
//!
//! ```rust
//! use strata_tl_types::{Deserializable, RemoteCall, Serializable, enums, functions};
//!
//! let call = functions::help::GetNearestDc {};
//! assert_eq!(call.to_bytes(), 0x1fb33026u32.to_le_bytes());
//!
//! let reply = [
//!     0x75, 0x17, 0x1a, 0x8e, // nearestDc
//!     2, b'D', b'E', 0,       // country
//!     2, 0, 0, 0,             // this_dc
//!     4, 0, 0, 0,             // nearest_dc
//! ];
//! let enums::NearestDc::NearestDc(dc) =
//!     <functions::help::GetNearestDc as RemoteCall>::Return::from_bytes(&reply).unwrap();
//! assert_eq!(dc.nearest_dc, 4);
//! ```

#![deny(unsafe_code)]
#![allow(clippy::large_enum_variant)]

pub mod deserialize;
pub mod serialize;
mod generated;

pub use deserialize::{Cursor, Deserializable};
pub use generated::{LAYER, enums, functions, name_for_id, types};
pub use serialize::Serializable;

/// Bare `vector<T>`: a count and the items, without the `Vector` id.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Bytes that are already serialized and pass through the codec untouched.
///
/// Serializing writes them verbatim; deserializing takes the rest of the
/// input. Useful for forwarding a query or answer without decoding it.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

/// Every generated constructor and function has a 32-bit id.
pub trait Identifiable {
    /// The id from the schema.
    const CONSTRUCTOR_ID: u32;
}

/// A function that can be sent as an RPC call.
pub trait RemoteCall: Serializable {
    /// What the server answers with.
    type Return: Deserializable;
}
