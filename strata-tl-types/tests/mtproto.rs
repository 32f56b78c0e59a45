#![cfg(feature = "tl-mtproto")]

use strata_tl_types::{Deserializable, Identifiable, Serializable, enums, functions, types};

fn res_pq_bytes() -> Vec<u8> {
    let mut b = Vec::new();
    0x05162463u32.serialize(&mut b);
    [1u8; 16].serialize(&mut b);
    [2u8; 16].serialize(&mut b);
    vec![0x17u8, 0xed, 0x48, 0x94, 0x1a, 0x08, 0xf9, 0x81].serialize(&mut b);
    vec![-3414540481677951611i64].serialize(&mut b);
    b
}

#[test]
fn res_pq_decodes() {
    let enums::ResPq::ResPq(res) = enums::ResPq::from_bytes(&res_pq_bytes()).unwrap();
    assert_eq!(res.nonce, [1; 16]);
    assert_eq!(res.server_nonce, [2; 16]);
    assert_eq!(u64::from_be_bytes(res.pq.as_slice().try_into().unwrap()), 0x17ED48941A08F981);
    assert_eq!(res.server_public_key_fingerprints, vec![-3414540481677951611]);
}

#[test]
fn variant_names_follow_the_boxed_type() {
    let salt = enums::BadMsgNotification::BadServerSalt(types::BadServerSalt {
        bad_msg_id: 4,
        bad_msg_seqno: 1,
        error_code: 48,
        new_server_salt: 99,
    });
    assert_eq!(salt.constructor_id(), 0xedab447b);

    let created = enums::NewSession::Created(types::NewSessionCreated {
        first_msg_id: 1,
        unique_id: 2,
        server_salt: 3,
    });
    assert_eq!(enums::NewSession::from_bytes(&created.to_bytes()).unwrap(), created);
}

#[test]
fn future_salts_use_bare_vector() {
    let salts = types::FutureSalts {
        req_msg_id: 10,
        now: 1_700_000_000,
        salts: strata_tl_types::RawVec(vec![types::FutureSalt {
            valid_since: 1_700_000_000,
            valid_until: 1_700_001_800,
            salt: 0x1122334455667788,
        }]),
    };
    let bytes = enums::FutureSalts::from(salts.clone()).to_bytes();
    // id, req_msg_id, now, count, then one bare future_salt (16 bytes)
    assert_eq!(bytes.len(), 4 + 8 + 4 + 4 + 16);
    let enums::FutureSalts::FutureSalts(back) = enums::FutureSalts::from_bytes(&bytes).unwrap();
    assert_eq!(back, salts);
}

#[test]
fn handshake_functions_carry_their_ids() {
    let req = functions::ReqPqMulti { nonce: [0; 16] };
    assert_eq!(&req.to_bytes()[..4], &0xbe7e8ef1u32.to_le_bytes());
    assert_eq!(functions::ReqDhParams::CONSTRUCTOR_ID, 0xd712e4be);
    assert_eq!(functions::SetClientDhParams::CONSTRUCTOR_ID, 0xf5045f1f);
}

#[cfg(feature = "deserializable-functions")]
#[test]
fn functions_decode_and_check_their_id() {
    let ping = functions::Ping { ping_id: 77 };
    assert_eq!(functions::Ping::from_bytes(&ping.to_bytes()).unwrap(), ping);
    let pong_bytes = types::Pong { msg_id: 1, ping_id: 2 }.to_bytes();
    assert!(functions::Ping::from_bytes(&pong_bytes).is_err());
}
