//! Plaintext session used while the auth key is being negotiated.

use std::fmt;

use strata_tl_types::{Deserializable, RemoteCall, deserialize};

use crate::message::{Message, MessageIds, PlainError};

/// Errors reading a plaintext reply.
#[derive(Clone, Debug, PartialEq)]
pub enum UnpackError {
    Frame(PlainError),
    Decode(deserialize::Error),
}

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => e.fmt(f),
            Self::Decode(e) => write!(f, "plaintext body: {e}"),
        }
    }
}

impl std::error::Error for UnpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Frame(e) => Some(e),
            Self::Decode(e) => Some(e),
        }
    }
}

impl From<PlainError> for UnpackError {
    fn from(e: PlainError) -> Self {
        Self::Frame(e)
    }
}

impl From<deserialize::Error> for UnpackError {
    fn from(e: deserialize::Error) -> Self {
        Self::Decode(e)
    }
}

/// Frames handshake calls as plaintext messages.
///
/// ```rust
/// use strata_mtproto::PlainSession;
/// use strata_tl_types::functions;
///
/// let mut session = PlainSession::new();
/// let wire = session.pack(&functions::ReqPqMulti { nonce: [0; 16] });
/// assert_eq!(&wire[..8], &[0; 8]);
/// ```
#[derive(Debug, Default)]
pub struct PlainSession {
    ids: MessageIds,
}

impl PlainSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `call` into a plaintext frame payload.
    pub fn pack<R: RemoteCall>(&mut self, call: &R) -> Vec<u8> {
        Message::plain(self.ids.next(), call.to_bytes()).to_plaintext_bytes()
    }

    /// Parse a plaintext frame as the answer to `R`.
    pub fn unpack<R: RemoteCall>(&self, frame: &[u8]) -> Result<R::Return, UnpackError> {
        let msg = Message::from_plaintext_bytes(frame)?;
        Ok(R::Return::from_bytes(&msg.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_tl_types::{Serializable, enums, functions, types};

    #[test]
    fn pack_uses_increasing_ids() {
        let mut s = PlainSession::new();
        let a = s.pack(&functions::ReqPqMulti { nonce: [1; 16] });
        let b = s.pack(&functions::ReqPqMulti { nonce: [1; 16] });
        let id_a = Message::from_plaintext_bytes(&a).unwrap().msg_id;
        let id_b = Message::from_plaintext_bytes(&b).unwrap().msg_id;
        assert!(id_b > id_a);
        assert_eq!(id_a % 4, 0);
    }

    #[test]
    fn unpack_decodes_the_return_type() {
        let res = enums::ResPq::ResPq(types::ResPq {
            nonce: [1; 16],
            server_nonce: [2; 16],
            pq: vec![0x17, 0xed, 0x48, 0x94, 0x1a, 0x08, 0xf9, 0x81],
            server_public_key_fingerprints: vec![1],
        });
        let frame = Message::plain(5, res.to_bytes()).to_plaintext_bytes();
        let s = PlainSession::new();
        assert_eq!(s.unpack::<functions::ReqPqMulti>(&frame).unwrap(), res);
    }

    #[test]
    fn unpack_reports_garbage() {
        let frame = Message::plain(5, vec![0; 4]).to_plaintext_bytes();
        let s = PlainSession::new();
        assert!(matches!(
            s.unpack::<functions::ReqPqMulti>(&frame),
            Err(UnpackError::Decode(_))
        ));
        assert!(matches!(
            s.unpack::<functions::ReqPqMulti>(&[0; 3]),
            Err(UnpackError::Frame(PlainError::TooShort { len: 3 }))
        ));
    }
}
