//! Bodies the server puts inside encrypted messages.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use strata_tl_types::{RawVec, Serializable, enums, types};

pub const RPC_RESULT_ID: u32 = 0xf35c6d01;
pub const MSG_CONTAINER_ID: u32 = 0x73f1f8dc;
pub const GZIP_PACKED_ID: u32 = 0x3072cfa1;

/// `rpc_result req_msg_id:long result:Object`.
pub fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + result.len());
    out.extend_from_slice(&RPC_RESULT_ID.to_le_bytes());
    out.extend_from_slice(&req_msg_id.to_le_bytes());
    out.extend_from_slice(result);
    out
}

/// An `rpc_result` carrying `rpc_error`.
pub fn rpc_error(req_msg_id: i64, code: i32, message: &str) -> Vec<u8> {
    let error = enums::RpcError::RpcError(types::RpcError {
        error_code: code,
        error_message: message.to_owned(),
    });
    rpc_result(req_msg_id, &error.to_bytes())
}

/// `msg_container` of `(msg_id, seq_no, body)` triples.
pub fn container(messages: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MSG_CONTAINER_ID.to_le_bytes());
    out.extend_from_slice(&(messages.len() as i32).to_le_bytes());
    for (msg_id, seq_no, body) in messages {
        out.extend_from_slice(&msg_id.to_le_bytes());
        out.extend_from_slice(&seq_no.to_le_bytes());
        out.extend_from_slice(&(body.len() as i32).to_le_bytes());
        out.extend_from_slice(body);
    }
    out
}

/// `gzip_packed packed_data:bytes`.
pub fn gzip_packed(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(body);
    let packed = encoder.finish().unwrap_or_default();

    let mut out = GZIP_PACKED_ID.to_le_bytes().to_vec();
    packed.serialize(&mut out);
    out
}

pub fn bad_msg_notification(bad_msg_id: i64, bad_msg_seqno: i32, error_code: i32) -> Vec<u8> {
    enums::BadMsgNotification::BadMsgNotification(types::BadMsgNotification {
        bad_msg_id,
        bad_msg_seqno,
        error_code,
    })
    .to_bytes()
}

pub fn bad_server_salt(bad_msg_id: i64, bad_msg_seqno: i32, new_server_salt: i64) -> Vec<u8> {
    enums::BadMsgNotification::BadServerSalt(types::BadServerSalt {
        bad_msg_id,
        bad_msg_seqno,
        error_code: 48,
        new_server_salt,
    })
    .to_bytes()
}

pub fn new_session_created(first_msg_id: i64, server_salt: i64) -> Vec<u8> {
    enums::NewSession::Created(types::NewSessionCreated {
        first_msg_id,
        unique_id: 0x5eed,
        server_salt,
    })
    .to_bytes()
}

pub fn pong(msg_id: i64, ping_id: i64) -> Vec<u8> {
    enums::Pong::Pong(types::Pong { msg_id, ping_id }).to_bytes()
}

pub fn msgs_ack(msg_ids: Vec<i64>) -> Vec<u8> {
    enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids }).to_bytes()
}

/// `future_salts` with one `(valid_since, valid_until, salt)` per entry.
pub fn future_salts(req_msg_id: i64, now: i32, salts: &[(i32, i32, i64)]) -> Vec<u8> {
    let salts = salts
        .iter()
        .map(|&(valid_since, valid_until, salt)| types::FutureSalt { valid_since, valid_until, salt })
        .collect();
    enums::FutureSalts::FutureSalts(types::FutureSalts { req_msg_id, now, salts: RawVec(salts) }).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn gzip_packed_inflates_to_the_body() {
        let packed = gzip_packed(b"0123456789abcdef");
        assert_eq!(&packed[..4], &GZIP_PACKED_ID.to_le_bytes());
        let data: Vec<u8> = strata_tl_types::Deserializable::from_bytes(&packed[4..]).unwrap();
        let mut inflated = Vec::new();
        GzDecoder::new(&data[..]).read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, b"0123456789abcdef");
    }

    #[test]
    fn container_layout() {
        let c = container(&[(5, 1, vec![1, 2, 3, 4])]);
        assert_eq!(c.len(), 4 + 4 + 16 + 4);
        assert_eq!(&c[8..16], &5i64.to_le_bytes());
    }
}
