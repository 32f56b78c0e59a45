//! A scripted, in-process MTProto server for tests.
//!
//! Nothing here talks to a network. The client side under test writes bytes,
//! a test feeds them to [`FrameReader`], hands the payloads to
//! [`HandshakeServer`] or [`EncryptedServer`], and writes the answers back.

pub mod builders;
pub mod frame;
pub mod handshake;
pub mod keys;
pub mod server;

use std::time::{SystemTime, UNIX_EPOCH};

pub use frame::{FrameReader, Framing};
pub use handshake::{HandshakeServer, Script, ScriptError};
pub use keys::ServerKey;
pub use server::{ClientMessage, EncryptedServer};

/// Wall clock seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// `f(i)` for every index.
pub fn pattern<const N: usize>(f: impl Fn(usize) -> u8) -> [u8; N] {
    std::array::from_fn(f)
}
