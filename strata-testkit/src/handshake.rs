//! The server half of the auth key exchange, driven by a fixed script.

use std::fmt;

use num_bigint::BigUint;
use strata_crypto::{AuthKey, aes, generate_key_data_from_nonce, sha1};
use strata_tl_types::{Cursor, Deserializable, Identifiable, Serializable, enums, functions, types};

use crate::frame::{parse_plain, plain_message};
use crate::keys::ServerKey;

/// The 2048-bit safe prime the production servers hand out.
pub const DH_PRIME_HEX: &str = "c71caeb9c6b1c9048e6c522f70f13f73980d40238e3e21c14934d037563d930f48198a0aa7c14058229493d22530f4dbfa336f6e0ac925139543aed44cce7c3720fd51f69458705ac68cd4fe6b6b13abdc9746512969328454f18faf8c595f642477fe96bb2a941d5bcd1d4ac8cc49880708fa9b378e3c4f3a9060bee67cf9a4a4a695811051907e162753b56b0f6b410dba74d8a84b2a14b3144e0ef1284754fd17ed950d5965b4b9dd46582db1178d169c6bc465b0d6ff9ca3928fef5b9ae4e418fc15e83ebea0f87fa9ff5eed70050ded2849f47bf959d956850ce929851f0d8115f635b105ee2e4e15d04b2454bf6f4fadf034b10403119cd8e3b92fcc5b";

/// `1229739323 * 1402015859`.
pub const PQ: u64 = 0x17ED_4894_1A08_F981;

pub fn dh_prime() -> BigUint {
    BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).unwrap_or_default()
}

/// What the scripted server sends and how it misbehaves.
#[derive(Clone, Debug)]
pub struct Script {
    pub server_nonce: [u8; 16],
    /// The server's secret exponent.
    pub a: [u8; 256],
    pub g: i32,
    pub dh_prime: Vec<u8>,
    pub server_time: i32,
    /// Answer `dh_gen_retry` this many times before `dh_gen_ok`.
    pub retries: usize,
    /// Answer `req_DH_params` with `server_DH_params_fail`.
    pub fail_dh_params: bool,
    /// Answer `set_client_DH_params` with `dh_gen_fail`.
    pub fail_dh_gen: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            server_nonce: std::array::from_fn(|i| (i * 5 + 1) as u8),
            a: std::array::from_fn(|i| ((i * 13 + 5) % 256) as u8),
            g: 3,
            dh_prime: dh_prime().to_bytes_be(),
            server_time: crate::unix_now() as i32,
            retries: 0,
            fail_dh_params: false,
            fail_dh_gen: false,
        }
    }
}

/// Why the server refused a client message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptError(pub String);

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted server: {}", self.0)
    }
}

impl std::error::Error for ScriptError {}

fn fail<T>(msg: impl Into<String>) -> Result<T, ScriptError> {
    Err(ScriptError(msg.into()))
}

/// Plays the server through `req_pq_multi`, `req_DH_params` and
/// `set_client_DH_params`.
#[derive(Debug)]
pub struct HandshakeServer {
    key: ServerKey,
    script: Script,
    nonce: [u8; 16],
    new_nonce: [u8; 32],
    tmp: Option<([u8; 32], [u8; 32])>,
    expected_retry_id: i64,
    retries_left: usize,
    auth_key: Option<AuthKey>,
    msg_counter: i64,
}

impl HandshakeServer {
    pub fn new(script: Script) -> Self {
        Self {
            key: ServerKey::test(),
            retries_left: script.retries,
            script,
            nonce: [0; 16],
            new_nonce: [0; 32],
            tmp: None,
            expected_retry_id: 0,
            auth_key: None,
            msg_counter: 0,
        }
    }

    pub fn key(&self) -> &ServerKey {
        &self.key
    }

    /// The key both sides agreed on, after `dh_gen_ok`.
    pub fn auth_key(&self) -> Option<&AuthKey> {
        self.auth_key.as_ref()
    }

    /// `new_nonce[0..8] XOR server_nonce[0..8]`.
    pub fn first_salt(&self) -> i64 {
        let mut salt = [0u8; 8];
        for (i, b) in salt.iter_mut().enumerate() {
            *b = self.new_nonce[i] ^ self.script.server_nonce[i];
        }
        i64::from_le_bytes(salt)
    }

    pub fn res_pq(&mut self, req: &functions::ReqPqMulti) -> enums::ResPq {
        self.nonce = req.nonce;
        enums::ResPq::ResPq(types::ResPq {
            nonce: req.nonce,
            server_nonce: self.script.server_nonce,
            pq: PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![self.key.fingerprint()],
        })
    }

    pub fn server_dh_params(&mut self, req: &functions::ReqDhParams) -> Result<enums::ServerDhParams, ScriptError> {
        self.check_nonces(&req.nonce, &req.server_nonce)?;
        if req.public_key_fingerprint != self.key.fingerprint() {
            return fail(format!("unknown fingerprint {}", req.public_key_fingerprint));
        }
        let Some(data) = self.key.decrypt(&req.encrypted_data) else {
            return fail("RSA_PAD hash mismatch");
        };
        let enums::PQInnerData::PQInnerData(inner) =
            enums::PQInnerData::from_bytes(&data).map_err(|e| ScriptError(format!("p_q_inner_data: {e}")))?
        else {
            return fail("expected p_q_inner_data");
        };
        if u64::from_be_bytes(inner.pq.as_slice().try_into().unwrap_or_default()) != PQ {
            return fail("pq mismatch");
        }
        let p = be_u64(&req.p);
        let q = be_u64(&req.q);
        if p.checked_mul(q) != Some(PQ) || p > q {
            return fail(format!("bad factors {p} * {q}"));
        }
        self.new_nonce = inner.new_nonce;

        if self.script.fail_dh_params {
            let digest = sha1!(&self.new_nonce);
            let mut new_nonce_hash = [0u8; 16];
            new_nonce_hash.copy_from_slice(&digest[4..]);
            return Ok(enums::ServerDhParams::Fail(types::ServerDhParamsFail {
                nonce: self.nonce,
                server_nonce: self.script.server_nonce,
                new_nonce_hash,
            }));
        }

        let prime = BigUint::from_bytes_be(&self.script.dh_prime);
        let a = BigUint::from_bytes_be(&self.script.a);
        let g_a = BigUint::from(self.script.g.unsigned_abs()).modpow(&a, &prime);

        let inner = enums::ServerDhInnerData::ServerDhInnerData(types::ServerDhInnerData {
            nonce: self.nonce,
            server_nonce: self.script.server_nonce,
            g: self.script.g,
            dh_prime: self.script.dh_prime.clone(),
            g_a: g_a.to_bytes_be(),
            server_time: self.script.server_time,
        })
        .to_bytes();

        let mut answer = sha1!(&inner).to_vec();
        answer.extend_from_slice(&inner);
        while answer.len() % 16 != 0 {
            answer.push(0);
        }

        let (key, iv) = generate_key_data_from_nonce(&self.script.server_nonce, &self.new_nonce);
        aes::ige_encrypt(&mut answer, &key, &iv);
        self.tmp = Some((key, iv));

        Ok(enums::ServerDhParams::Ok(types::ServerDhParamsOk {
            nonce: self.nonce,
            server_nonce: self.script.server_nonce,
            encrypted_answer: answer,
        }))
    }

    pub fn client_dh_params(
        &mut self,
        req: &functions::SetClientDhParams,
    ) -> Result<enums::SetClientDhParamsAnswer, ScriptError> {
        self.check_nonces(&req.nonce, &req.server_nonce)?;
        let Some((key, iv)) = self.tmp else {
            return fail("set_client_DH_params before req_DH_params");
        };
        if req.encrypted_data.len() % 16 != 0 || req.encrypted_data.len() < 32 {
            return fail("encrypted_data is not block aligned");
        }
        let mut plain = req.encrypted_data.clone();
        aes::ige_decrypt(&mut plain, &key, &iv);

        let mut cursor = Cursor::from_slice(&plain[20..]);
        let enums::ClientDhInnerData::ClientDhInnerData(inner) = enums::ClientDhInnerData::deserialize(&mut cursor)
            .map_err(|e| ScriptError(format!("client_DH_inner_data: {e}")))?;
        let hash = sha1!(&plain[20..20 + cursor.pos()]);
        if hash[..] != plain[..20] {
            return fail("client_DH_inner_data hash mismatch");
        }
        if inner.retry_id != self.expected_retry_id {
            return fail(format!("retry_id {} != {}", inner.retry_id, self.expected_retry_id));
        }

        let prime = BigUint::from_bytes_be(&self.script.dh_prime);
        let a = BigUint::from_bytes_be(&self.script.a);
        let shared = BigUint::from_bytes_be(&inner.g_b).modpow(&a, &prime);
        let be = shared.to_bytes_be();
        let mut bytes = [0u8; 256];
        bytes[256 - be.len()..].copy_from_slice(&be);
        let auth_key = AuthKey::from_bytes(bytes);

        let nonce = self.nonce;
        let server_nonce = self.script.server_nonce;
        if self.script.fail_dh_gen {
            return Ok(enums::SetClientDhParamsAnswer::DhGenFail(types::DhGenFail {
                nonce,
                server_nonce,
                new_nonce_hash3: auth_key.calc_new_nonce_hash(&self.new_nonce, 3),
            }));
        }
        if self.retries_left > 0 {
            self.retries_left -= 1;
            self.expected_retry_id = i64::from_le_bytes(auth_key.aux_hash());
            return Ok(enums::SetClientDhParamsAnswer::DhGenRetry(types::DhGenRetry {
                nonce,
                server_nonce,
                new_nonce_hash2: auth_key.calc_new_nonce_hash(&self.new_nonce, 2),
            }));
        }

        let answer = enums::SetClientDhParamsAnswer::DhGenOk(types::DhGenOk {
            nonce,
            server_nonce,
            new_nonce_hash1: auth_key.calc_new_nonce_hash(&self.new_nonce, 1),
        });
        self.auth_key = Some(auth_key);
        Ok(answer)
    }

    /// Answer one plaintext message frame with another.
    pub fn respond(&mut self, frame: &[u8]) -> Result<Vec<u8>, ScriptError> {
        let Some((_, body)) = parse_plain(frame) else {
            return fail("not a plaintext message");
        };
        let id = Cursor::from_slice(body).peek_u32().map_err(|e| ScriptError(e.to_string()))?;
        let decode = |e: strata_tl_types::deserialize::Error| ScriptError(e.to_string());

        let reply = match id {
            id if id == functions::ReqPqMulti::CONSTRUCTOR_ID => {
                self.res_pq(&functions::ReqPqMulti::from_bytes(body).map_err(decode)?).to_bytes()
            }
            id if id == functions::ReqDhParams::CONSTRUCTOR_ID => self
                .server_dh_params(&functions::ReqDhParams::from_bytes(body).map_err(decode)?)?
                .to_bytes(),
            id if id == functions::SetClientDhParams::CONSTRUCTOR_ID => self
                .client_dh_params(&functions::SetClientDhParams::from_bytes(body).map_err(decode)?)?
                .to_bytes(),
            other => return fail(format!("unexpected constructor {other:#010x}")),
        };

        self.msg_counter += 1;
        let msg_id = (i64::from(self.script.server_time) << 32) | (self.msg_counter * 4 + 1);
        Ok(plain_message(msg_id, &reply))
    }

    fn check_nonces(&self, nonce: &[u8; 16], server_nonce: &[u8; 16]) -> Result<(), ScriptError> {
        if *nonce != self.nonce || *server_nonce != self.script.server_nonce {
            return fail("nonce mismatch");
        }
        Ok(())
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn res_pq_advertises_the_test_key() {
        let mut server = HandshakeServer::new(Script::default());
        let enums::ResPq::ResPq(res) = server.res_pq(&functions::ReqPqMulti { nonce: [9; 16] });
        assert_eq!(res.nonce, [9; 16]);
        assert_eq!(res.server_public_key_fingerprints, vec![ServerKey::test().fingerprint()]);
        assert_eq!(res.pq, PQ.to_be_bytes());
    }

    #[test]
    fn req_dh_params_needs_matching_nonces() {
        let mut server = HandshakeServer::new(Script::default());
        server.res_pq(&functions::ReqPqMulti { nonce: [9; 16] });
        let err = server
            .server_dh_params(&functions::ReqDhParams {
                nonce: [8; 16],
                server_nonce: Script::default().server_nonce,
                p: vec![],
                q: vec![],
                public_key_fingerprint: 0,
                encrypted_data: vec![],
            })
            .unwrap_err();
        assert_eq!(err, ScriptError("nonce mismatch".into()));
    }

    #[test]
    fn respond_rejects_encrypted_frames() {
        let mut server = HandshakeServer::new(Script::default());
        let mut frame = plain_message(1, &[0; 4]);
        frame[0] = 1;
        assert!(server.respond(&frame).is_err());
    }
}
