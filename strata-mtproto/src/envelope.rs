//! Decoding of the service layer that wraps every server message.
//!
//! A decrypted message body may be a `msg_container` of several messages, a
//! `gzip_packed` object, an `rpc_result` answering one of our requests, one
//! of the session control messages, or an update. [`decode`] flattens all of
//! that into a list of [`Incoming`] messages.

use std::fmt;
use std::io::Read;

use flate2::read::GzDecoder;
use log::warn;
use strata_tl_types::{Cursor, Deserializable, Identifiable, deserialize, enums, types};

/// `rpc_result#f35c6d01 req_msg_id:long result:Object`
pub const RPC_RESULT_ID: u32 = 0xf35c6d01;
/// `msg_container#73f1f8dc messages:vector<message>`
pub const MSG_CONTAINER_ID: u32 = 0x73f1f8dc;
/// `gzip_packed#3072cfa1 packed_data:bytes`
pub const GZIP_PACKED_ID: u32 = 0x3072cfa1;

/// Inflated objects larger than this are refused.
pub const MAX_INFLATED: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub enum Error {
    Decode(deserialize::Error),
    Gzip(std::io::Error),
    /// The inflated object exceeds [`MAX_INFLATED`].
    TooLarge,
    /// A container inside a container.
    NestedContainer,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "envelope decode: {e}"),
            Self::Gzip(e) => write!(f, "gzip_packed: {e}"),
            Self::TooLarge => write!(f, "gzip_packed object exceeds {MAX_INFLATED} bytes"),
            Self::NestedContainer => write!(f, "msg_container nested in msg_container"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Gzip(e) => Some(e),
            _ => None,
        }
    }
}

impl From<deserialize::Error> for Error {
    fn from(e: deserialize::Error) -> Self {
        Self::Decode(e)
    }
}

/// What a single message turned out to be.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// The answer to `req_msg_id`: the (inflated) result object, or the
    /// `rpc_error` the server returned instead.
    RpcResult {
        req_msg_id: i64,
        result: Result<Vec<u8>, types::RpcError>,
    },
    MsgsAck(types::MsgsAck),
    BadMsg(types::BadMsgNotification),
    BadServerSalt(types::BadServerSalt),
    NewSessionCreated(types::NewSessionCreated),
    FutureSalts(types::FutureSalts),
    Pong(types::Pong),
    DetailedInfo(enums::MsgDetailedInfo),
    DestroySession(enums::DestroySessionRes),
    /// Anything else: an update or an object we have no use for.
    Other { constructor_id: u32 },
}

/// One message after unwrapping containers and compression.
#[derive(Clone, Debug, PartialEq)]
pub struct Incoming {
    pub msg_id: i64,
    pub seq_no: i32,
    /// The message body with any outer `gzip_packed` removed.
    pub body: Vec<u8>,
    pub envelope: Envelope,
}

impl Incoming {
    /// Content-related messages (odd `seq_no`) must be acknowledged.
    pub fn needs_ack(&self) -> bool {
        self.seq_no & 1 == 1
    }
}

/// Flatten one decrypted message into its parts.
pub fn decode(msg_id: i64, seq_no: i32, body: Vec<u8>) -> Result<Vec<Incoming>, Error> {
    let mut out = Vec::new();
    decode_into(msg_id, seq_no, body, true, &mut out)?;
    Ok(out)
}

fn decode_into(
    msg_id: i64,
    seq_no: i32,
    body: Vec<u8>,
    allow_container: bool,
    out: &mut Vec<Incoming>,
) -> Result<(), Error> {
    let body = unpack_gzip(body)?;
    let id = Cursor::from_slice(&body).peek_u32()?;

    if id == MSG_CONTAINER_ID {
        if !allow_container {
            return Err(Error::NestedContainer);
        }
        for (inner_id, inner_seq, inner_body) in read_container(&body)? {
            decode_into(inner_id, inner_seq, inner_body, false, out)?;
        }
        return Ok(());
    }

    let envelope = classify(id, &body)?;
    out.push(Incoming { msg_id, seq_no, body, envelope });
    Ok(())
}

fn classify(id: u32, body: &[u8]) -> Result<Envelope, Error> {
    Ok(match id {
        RPC_RESULT_ID => {
            let mut cursor = Cursor::from_slice(body);
            cursor.read_slice(4)?;
            let req_msg_id = i64::deserialize(&mut cursor)?;
            let result = unpack_gzip(cursor.rest().to_vec())?;
            let result = if Cursor::from_slice(&result).peek_u32()? == types::RpcError::CONSTRUCTOR_ID {
                let enums::RpcError::RpcError(err) = enums::RpcError::from_bytes(&result)?;
                Err(err)
            } else {
                Ok(result)
            };
            Envelope::RpcResult { req_msg_id, result }
        }
        id if id == types::MsgsAck::CONSTRUCTOR_ID => {
            let enums::MsgsAck::MsgsAck(ack) = enums::MsgsAck::from_bytes(body)?;
            Envelope::MsgsAck(ack)
        }
        id if id == types::BadMsgNotification::CONSTRUCTOR_ID || id == types::BadServerSalt::CONSTRUCTOR_ID => {
            match enums::BadMsgNotification::from_bytes(body)? {
                enums::BadMsgNotification::BadMsgNotification(n) => Envelope::BadMsg(n),
                enums::BadMsgNotification::BadServerSalt(s) => Envelope::BadServerSalt(s),
            }
        }
        id if id == types::NewSessionCreated::CONSTRUCTOR_ID => {
            let enums::NewSession::Created(created) = enums::NewSession::from_bytes(body)?;
            Envelope::NewSessionCreated(created)
        }
        id if id == types::FutureSalts::CONSTRUCTOR_ID => {
            let enums::FutureSalts::FutureSalts(salts) = enums::FutureSalts::from_bytes(body)?;
            Envelope::FutureSalts(salts)
        }
        id if id == types::Pong::CONSTRUCTOR_ID => {
            let enums::Pong::Pong(pong) = enums::Pong::from_bytes(body)?;
            Envelope::Pong(pong)
        }
        id if id == types::MsgDetailedInfo::CONSTRUCTOR_ID || id == types::MsgNewDetailedInfo::CONSTRUCTOR_ID => {
            Envelope::DetailedInfo(enums::MsgDetailedInfo::from_bytes(body)?)
        }
        id if id == types::DestroySessionOk::CONSTRUCTOR_ID || id == types::DestroySessionNone::CONSTRUCTOR_ID => {
            Envelope::DestroySession(enums::DestroySessionRes::from_bytes(body)?)
        }
        constructor_id => Envelope::Other { constructor_id },
    })
}

/// `message msg_id:long seqno:int bytes:int body:Object` items.
fn read_container(body: &[u8]) -> Result<Vec<(i64, i32, Vec<u8>)>, Error> {
    let mut cursor = Cursor::from_slice(body);
    cursor.read_slice(4)?;
    let count = i32::deserialize(&mut cursor)?;
    // Each item has a 16-byte header.
    let count = usize::try_from(count)
        .ok()
        .filter(|&n| n <= cursor.remaining() / 16)
        .ok_or(deserialize::Error::InvalidLength { len: i64::from(count) })?;

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let msg_id = i64::deserialize(&mut cursor)?;
        let seq_no = i32::deserialize(&mut cursor)?;
        let len = i32::deserialize(&mut cursor)?;
        let len = usize::try_from(len).map_err(|_| deserialize::Error::InvalidLength { len: i64::from(len) })?;
        items.push((msg_id, seq_no, cursor.read_slice(len)?.to_vec()));
    }
    if cursor.remaining() != 0 {
        warn!("[strata] {} trailing bytes after msg_container", cursor.remaining());
    }
    Ok(items)
}

/// Inflate `body` if it is a `gzip_packed`; return it unchanged otherwise.
pub fn unpack_gzip(body: Vec<u8>) -> Result<Vec<u8>, Error> {
    let mut cursor = Cursor::from_slice(&body);
    if cursor.peek_u32()? != GZIP_PACKED_ID {
        return Ok(body);
    }
    cursor.read_slice(4)?;
    let packed = deserialize::read_bytes(&mut cursor)?;

    let mut inflated = Vec::new();
    GzDecoder::new(packed)
        .take(MAX_INFLATED as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(Error::Gzip)?;
    if inflated.len() > MAX_INFLATED {
        return Err(Error::TooLarge);
    }
    Ok(inflated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use strata_tl_types::{RawVec, Serializable};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        let packed = enc.finish().unwrap();
        let mut out = Vec::new();
        GZIP_PACKED_ID.serialize(&mut out);
        packed.serialize(&mut out);
        out
    }

    fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        RPC_RESULT_ID.serialize(&mut out);
        req_msg_id.serialize(&mut out);
        out.extend_from_slice(result);
        out
    }

    fn container(items: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        MSG_CONTAINER_ID.serialize(&mut out);
        (items.len() as i32).serialize(&mut out);
        for (id, seq, body) in items {
            id.serialize(&mut out);
            seq.serialize(&mut out);
            (body.len() as i32).serialize(&mut out);
            out.extend_from_slice(body);
        }
        out
    }

    fn pong(msg_id: i64, ping_id: i64) -> Vec<u8> {
        enums::Pong::Pong(types::Pong { msg_id, ping_id }).to_bytes()
    }

    #[test]
    fn rpc_result_carries_raw_answer() {
        let answer = pong(4, 5);
        let parts = decode(1, 1, rpc_result(8, &answer)).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].envelope,
            Envelope::RpcResult { req_msg_id: 8, result: Ok(answer) }
        );
        assert!(parts[0].needs_ack());
    }

    #[test]
    fn rpc_error_is_split_out() {
        let err = enums::RpcError::RpcError(types::RpcError {
            error_code: 420,
            error_message: "FLOOD_WAIT_7".into(),
        })
        .to_bytes();
        let parts = decode(1, 1, rpc_result(8, &err)).unwrap();
        match &parts[0].envelope {
            Envelope::RpcResult { req_msg_id: 8, result: Err(e) } => {
                assert_eq!(e.error_code, 420);
                assert_eq!(e.error_message, "FLOOD_WAIT_7");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gzip_inside_rpc_result_is_inflated() {
        let answer = pong(1, 2);
        let parts = decode(3, 1, rpc_result(9, &gzip(&answer))).unwrap();
        assert_eq!(parts[0].envelope, Envelope::RpcResult { req_msg_id: 9, result: Ok(answer) });
    }

    #[test]
    fn container_is_flattened() {
        let salt = enums::BadMsgNotification::BadServerSalt(types::BadServerSalt {
            bad_msg_id: 100,
            bad_msg_seqno: 3,
            error_code: 48,
            new_server_salt: 77,
        })
        .to_bytes();
        let ack = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids: vec![100] }).to_bytes();
        let body = container(&[(11, 2, salt), (13, 2, ack), (15, 3, gzip(&pong(100, 1)))]);

        let parts = decode(17, 0, body).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0].envelope, Envelope::BadServerSalt(s) if s.new_server_salt == 77));
        assert!(matches!(&parts[1].envelope, Envelope::MsgsAck(a) if a.msg_ids == vec![100]));
        assert_eq!(parts[2].envelope, Envelope::Pong(types::Pong { msg_id: 100, ping_id: 1 }));
        assert_eq!(parts[2].msg_id, 15);
        assert_eq!(parts[2].body, pong(100, 1));
    }

    #[test]
    fn nested_container_is_rejected() {
        let inner = container(&[(1, 1, pong(1, 1))]);
        let outer = container(&[(2, 0, inner)]);
        assert!(matches!(decode(3, 0, outer), Err(Error::NestedContainer)));
    }

    #[test]
    fn truncated_container_is_an_error() {
        let mut body = container(&[(1, 1, pong(1, 1))]);
        body.truncate(body.len() - 4);
        assert!(matches!(decode(3, 0, body), Err(Error::Decode(_))));
    }

    #[test]
    fn session_messages_are_classified() {
        let created = enums::NewSession::Created(types::NewSessionCreated {
            first_msg_id: 1,
            unique_id: 2,
            server_salt: 3,
        })
        .to_bytes();
        assert!(matches!(
            decode(1, 1, created).unwrap()[0].envelope,
            Envelope::NewSessionCreated(types::NewSessionCreated { server_salt: 3, .. })
        ));

        let salts = enums::FutureSalts::FutureSalts(types::FutureSalts {
            req_msg_id: 5,
            now: 100,
            salts: RawVec(vec![types::FutureSalt { valid_since: 100, valid_until: 200, salt: 9 }]),
        })
        .to_bytes();
        assert!(matches!(
            &decode(1, 0, salts).unwrap()[0].envelope,
            Envelope::FutureSalts(s) if s.req_msg_id == 5 && s.salts.0.len() == 1
        ));
    }

    #[test]
    fn unknown_objects_pass_through() {
        let update = 0x12345678u32.to_le_bytes().to_vec();
        let parts = decode(5, 1, update.clone()).unwrap();
        assert_eq!(parts[0].envelope, Envelope::Other { constructor_id: 0x12345678 });
        assert_eq!(parts[0].body, update);
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(matches!(decode(1, 1, Vec::new()), Err(Error::Decode(_))));
    }
}
