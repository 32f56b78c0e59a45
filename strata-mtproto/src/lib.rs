//! Sans-IO MTProto 2.0.
//!
//! This crate handles:
//! * Transport framings ([`transport`])
//! * Plaintext messages for the key exchange ([`PlainSession`])
//! * The auth key handshake as a chain of typed states ([`authentication`])
//! * Encrypted messages with message ids, sequence numbers, salts and replay
//!   checks ([`EncryptedSession`])
//! * Decoding of containers, compressed bodies and service messages
//!   ([`envelope`])
//!
//! Nothing here touches a socket or a clock you did not pass in; the async
//! client in `strata-client` drives it.

#![deny(unsafe_code)]

pub mod authentication;
pub mod encrypted;
pub mod envelope;
pub mod message;
pub mod salt;
pub mod session;
pub mod transport;

pub use encrypted::{DecryptError, DecryptedMessage, EncryptedSession, OutgoingMessage, WrapError};
pub use envelope::{Envelope, Incoming};
pub use message::{Message, MessageIds, MsgKind, SeqNo};
pub use salt::{SaltSet, ServerSalt};
pub use session::{PlainSession, UnpackError};
pub use transport::{FrameError, Framing, TransportKind};
