//! Sans-IO auth key generation.
//!
//! Every step consumes the previous state by value, so a handshake can only
//! move forward and a state cannot be replayed.
//!
//! ```text
//! let (req, s) = authentication::step1()?;
//! // send req, receive res_pq
//! let (req, s) = authentication::step2(s, res_pq, &keys)?;
//! // send req, receive server_dh_params
//! let (req, mut s) = authentication::step3(s, server_dh_params)?;
//! loop {
//!     // send req, receive answer
//!     match authentication::finish(s, answer)? {
//!         Answer::Done(done) => break done,
//!         Answer::Retry(next_req, next) => { req = next_req; s = next; }
//!     }
//! }
//! ```
//!
//! The `do_*` variants take their randomness and clock as arguments.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use num_bigint::BigUint;
use strata_crypto::dh::{self, DhError};
use strata_crypto::rsa::{self, RsaError};
use strata_crypto::{AuthKey, aes, factorize, generate_key_data_from_nonce, sha1};
use strata_tl_types::{Cursor, Deserializable, Serializable, deserialize, enums, functions, types};

/// Errors that abort the key exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidNewNonceHash { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize { size: usize },
    /// `pq` could not be split into two factors.
    Factorization { pq: u64 },
    UnknownFingerprints { fingerprints: Vec<i64> },
    Rsa(RsaError),
    /// The server answered `server_DH_params_fail`.
    DhParamsFail,
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData { error: deserialize::Error },
    InvalidAnswerHash { got: [u8; 20], expected: [u8; 20] },
    Dh(DhError),
    /// The server answered `dh_gen_fail`.
    DhGenFail,
    Random(getrandom::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { got, expected } => {
                write!(f, "nonce mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidServerNonce { got, expected } => {
                write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidNewNonceHash { got, expected } => {
                write!(f, "new_nonce_hash mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidPqSize { size } => write!(f, "pq is {size} bytes, expected 8"),
            Self::Factorization { pq } => write!(f, "could not factorize pq={pq}"),
            Self::UnknownFingerprints { fingerprints } => {
                write!(f, "no known RSA key among fingerprints {fingerprints:?}")
            }
            Self::Rsa(e) => write!(f, "RSA_PAD: {e}"),
            Self::DhParamsFail => write!(f, "server refused the DH parameters request"),
            Self::EncryptedResponseNotPadded { len } => {
                write!(f, "encrypted answer of {len} bytes is not a valid AES block sequence")
            }
            Self::InvalidDhInnerData { error } => write!(f, "server_DH_inner_data: {error}"),
            Self::InvalidAnswerHash { got, expected } => {
                write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}")
            }
            Self::Dh(e) => write!(f, "DH parameters: {e}"),
            Self::DhGenFail => write!(f, "server answered dh_gen_fail"),
            Self::Random(e) => write!(f, "random source: {e}"),
        }
    }
}

impl From<DhError> for Error {
    fn from(e: DhError) -> Self {
        Self::Dh(e)
    }
}

impl From<RsaError> for Error {
    fn from(e: RsaError) -> Self {
        Self::Rsa(e)
    }
}

impl From<getrandom::Error> for Error {
    fn from(e: getrandom::Error) -> Self {
        Self::Random(e)
    }
}

/// Waiting for `resPQ`.
#[derive(Debug)]
pub struct PqRequested {
    nonce: [u8; 16],
}

/// Waiting for `server_DH_params`.
#[derive(Debug)]
pub struct DhParamsRequested {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}

/// Waiting for `dh_gen_ok`, `dh_gen_retry` or `dh_gen_fail`.
#[derive(Debug)]
pub struct ClientDhParamsSent {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    dh_prime: BigUint,
    g: BigUint,
    g_a: BigUint,
    tmp_key: [u8; 32],
    tmp_iv: [u8; 32],
    auth_key: AuthKey,
    time_offset: i32,
}

impl PqRequested {
    pub fn nonce(&self) -> [u8; 16] {
        self.nonce
    }
}

/// A negotiated key.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key: AuthKey,
    /// Server time minus local time, in seconds.
    pub time_offset: i32,
    pub first_salt: i64,
}

/// What [`finish`] produced.
#[derive(Debug)]
pub enum Answer {
    Done(Finished),
    /// The server asked for another `g_b`; send the request and call
    /// [`finish`] again with the new state.
    Retry(functions::SetClientDhParams, ClientDhParamsSent),
}

/// The keys a client accepts by default.
pub fn default_keys() -> Vec<rsa::Key> {
    vec![rsa::Key::production(), rsa::Key::test()]
}

fn random_array<const N: usize>() -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf)?;
    Ok(buf)
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

pub fn step1() -> Result<(functions::ReqPqMulti, PqRequested), Error> {
    Ok(do_step1(&random_array()?))
}

pub fn do_step1(random: &[u8; 16]) -> (functions::ReqPqMulti, PqRequested) {
    let nonce = *random;
    debug!("[strata] auth step 1: req_pq_multi");
    (functions::ReqPqMulti { nonce }, PqRequested { nonce })
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Check `resPQ`, factorize `pq` and RSA-encrypt the inner data for one of
/// `keys`.
pub fn step2(
    data: PqRequested,
    response: enums::ResPq,
    keys: &[rsa::Key],
) -> Result<(functions::ReqDhParams, DhParamsRequested), Error> {
    do_step2(data, response, keys, &random_array()?)
}

/// `random` supplies the new nonce (32 bytes) and the RSA_PAD randomness
/// (224 bytes).
pub fn do_step2(
    data: PqRequested,
    response: enums::ResPq,
    keys: &[rsa::Key],
    random: &[u8; 256],
) -> Result<(functions::ReqDhParams, DhParamsRequested), Error> {
    let PqRequested { nonce } = data;
    let enums::ResPq::ResPq(res_pq) = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    let pq_bytes: [u8; 8] = res_pq
        .pq
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
    let pq = u64::from_be_bytes(pq_bytes);
    let (p, q) = factorize(pq).ok_or(Error::Factorization { pq })?;
    debug!("[strata] auth step 2: pq={pq} p={p} q={q}");

    let (fingerprint, key) = res_pq
        .server_public_key_fingerprints
        .iter()
        .find_map(|&fp| keys.iter().find(|k| k.fingerprint() == fp).map(|k| (fp, k)))
        .ok_or_else(|| Error::UnknownFingerprints {
            fingerprints: res_pq.server_public_key_fingerprints.clone(),
        })?;

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);
    let mut rsa_random = [0u8; 224];
    rsa_random.copy_from_slice(&random[32..]);

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = enums::PQInnerData::PQInnerData(types::PQInnerData {
        pq: res_pq.pq.clone(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: res_pq.server_nonce,
        new_nonce,
    })
    .to_bytes();

    let ciphertext = rsa::encrypt_hashed(&pq_inner, key, &rsa_random)?;

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: fingerprint,
            encrypted_data: ciphertext,
        },
        DhParamsRequested { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

/// Big-endian bytes without leading zeros.
fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Decrypt and validate the server's DH parameters and answer with `g_b`.
pub fn step3(
    data: DhParamsRequested,
    response: enums::ServerDhParams,
) -> Result<(functions::SetClientDhParams, ClientDhParamsSent), Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i32);
    do_step3(data, response, &random_array()?, now)
}

/// `random` supplies `b` (256 bytes) and the padding (16 bytes); `now` is
/// the local Unix time in seconds.
pub fn do_step3(
    data: DhParamsRequested,
    response: enums::ServerDhParams,
    random: &[u8; 272],
    now: i32,
) -> Result<(functions::SetClientDhParams, ClientDhParamsSent), Error> {
    let DhParamsRequested { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(fail) => {
            check_nonce(&fail.nonce, &nonce)?;
            check_server_nonce(&fail.server_nonce, &server_nonce)?;
            let digest = sha1!(&new_nonce);
            let mut expected = [0u8; 16];
            expected.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&fail.new_nonce_hash, &expected)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(ok) => ok,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len < 32 || len % 16 != 0 {
        return Err(Error::EncryptedResponseNotPadded { len });
    }

    let (tmp_key, tmp_iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &tmp_key, &tmp_iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let enums::ServerDhInnerData::ServerDhInnerData(inner) =
        enums::ServerDhInnerData::deserialize(&mut cursor)
            .map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash = sha1!(&plain[20..20 + cursor.pos()]);
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    dh::check_prime(&dh_prime)?;
    let g_u32 = u32::try_from(inner.g).map_err(|_| DhError::Generator { g: inner.g as u32 })?;
    dh::check_generator(g_u32, &dh_prime)?;
    let g = BigUint::from(g_u32);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    dh::check_public_value(&g_a, &dh_prime)?;

    let time_offset = inner.server_time.wrapping_sub(now);
    debug!("[strata] auth step 3: g={g_u32}, time offset {time_offset}s");

    let mut state = ClientDhParamsSent {
        nonce,
        server_nonce,
        new_nonce,
        dh_prime,
        g,
        g_a,
        tmp_key,
        tmp_iv,
        auth_key: AuthKey::from_bytes([0; 256]),
        time_offset,
    };
    let request = state.next_attempt(0, random)?;
    Ok((request, state))
}

impl ClientDhParamsSent {
    /// Pick `b` from `random`, derive the candidate key and build the
    /// encrypted `client_DH_inner_data`.
    fn next_attempt(&mut self, retry_id: i64, random: &[u8; 272]) -> Result<functions::SetClientDhParams, Error> {
        let b = BigUint::from_bytes_be(&random[..256]);
        let g_b = dh::modpow(&self.g, &b, &self.dh_prime);
        dh::check_public_value(&g_b, &self.dh_prime)?;
        let gab = dh::modpow(&self.g_a, &b, &self.dh_prime);
        self.auth_key = AuthKey::from_bytes(dh::to_bytes_256(&gab));

        let client_dh_inner = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
            nonce: self.nonce,
            server_nonce: self.server_nonce,
            retry_id,
            g_b: g_b.to_bytes_be(),
        })
        .to_bytes();

        let pad_len = (16 - (20 + client_dh_inner.len()) % 16) % 16;
        let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
        hashed.extend_from_slice(&sha1!(&client_dh_inner));
        hashed.extend_from_slice(&client_dh_inner);
        hashed.extend_from_slice(&random[256..256 + pad_len]);

        aes::ige_encrypt(&mut hashed, &self.tmp_key, &self.tmp_iv);

        Ok(functions::SetClientDhParams {
            nonce: self.nonce,
            server_nonce: self.server_nonce,
            encrypted_data: hashed,
        })
    }
}

// ─── finish ──────────────────────────────────────────────────────────────────

/// Check the server's verdict on our `g_b`.
pub fn finish(data: ClientDhParamsSent, response: enums::SetClientDhParamsAnswer) -> Result<Answer, Error> {
    do_finish(data, response, &random_array()?)
}

/// `random` is only used when the server asks for a retry.
pub fn do_finish(
    mut data: ClientDhParamsSent,
    response: enums::SetClientDhParamsAnswer,
    random: &[u8; 272],
) -> Result<Answer, Error> {
    let (answer_nonce, answer_server_nonce, hash, number) = match &response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) => (x.nonce, x.server_nonce, x.new_nonce_hash1, 1),
        enums::SetClientDhParamsAnswer::DhGenRetry(x) => (x.nonce, x.server_nonce, x.new_nonce_hash2, 2),
        enums::SetClientDhParamsAnswer::DhGenFail(x) => (x.nonce, x.server_nonce, x.new_nonce_hash3, 3),
    };

    check_nonce(&answer_nonce, &data.nonce)?;
    check_server_nonce(&answer_server_nonce, &data.server_nonce)?;
    let expected = data.auth_key.calc_new_nonce_hash(&data.new_nonce, number);
    check_new_nonce_hash(&hash, &expected)?;

    match number {
        1 => {
            let mut salt = [0u8; 8];
            for ((dst, a), b) in salt.iter_mut().zip(&data.new_nonce[..8]).zip(&data.server_nonce[..8]) {
                *dst = a ^ b;
            }
            debug!("[strata] auth finished: {:?}", data.auth_key);
            Ok(Answer::Done(Finished {
                auth_key: data.auth_key,
                time_offset: data.time_offset,
                first_salt: i64::from_le_bytes(salt),
            }))
        }
        2 => {
            let retry_id = i64::from_le_bytes(data.auth_key.aux_hash());
            debug!("[strata] auth retry with retry_id {retry_id}");
            let request = data.next_attempt(retry_id, random)?;
            Ok(Answer::Retry(request, data))
        }
        _ => Err(Error::DhGenFail),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}

fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res_pq(nonce: [u8; 16], pq: Vec<u8>, fingerprints: Vec<i64>) -> enums::ResPq {
        enums::ResPq::ResPq(types::ResPq {
            nonce,
            server_nonce: [2; 16],
            pq,
            server_public_key_fingerprints: fingerprints,
        })
    }

    const PQ: [u8; 8] = [0x17, 0xed, 0x48, 0x94, 0x1a, 0x08, 0xf9, 0x81];

    #[test]
    fn step1_echoes_the_nonce() {
        let (req, state) = do_step1(&[7; 16]);
        assert_eq!(req.nonce, [7; 16]);
        assert_eq!(state.nonce(), [7; 16]);
    }

    #[test]
    fn step2_rejects_a_foreign_nonce() {
        let (_, state) = do_step1(&[7; 16]);
        let err = do_step2(state, res_pq([8; 16], PQ.to_vec(), vec![]), &default_keys(), &[0; 256]).unwrap_err();
        assert_eq!(err, Error::InvalidNonce { got: [8; 16], expected: [7; 16] });
    }

    #[test]
    fn step2_requires_eight_byte_pq() {
        let (_, state) = do_step1(&[7; 16]);
        let err = do_step2(state, res_pq([7; 16], vec![1, 2, 3], vec![]), &default_keys(), &[0; 256]).unwrap_err();
        assert_eq!(err, Error::InvalidPqSize { size: 3 });
    }

    #[test]
    fn step2_requires_a_known_key() {
        let (_, state) = do_step1(&[7; 16]);
        let err = do_step2(state, res_pq([7; 16], PQ.to_vec(), vec![1, 2]), &default_keys(), &[0; 256]).unwrap_err();
        assert_eq!(err, Error::UnknownFingerprints { fingerprints: vec![1, 2] });
    }

    #[test]
    fn step2_builds_req_dh_params() {
        let (_, state) = do_step1(&[7; 16]);
        let fp = rsa::Key::production().fingerprint();
        let (req, state) =
            do_step2(state, res_pq([7; 16], PQ.to_vec(), vec![99, fp]), &default_keys(), &[3; 256]).unwrap();
        assert_eq!(req.public_key_fingerprint, fp);
        assert_eq!(req.p, 1229739323u64.to_be_bytes()[4..].to_vec());
        assert_eq!(req.q, 1402015859u64.to_be_bytes()[4..].to_vec());
        assert_eq!(req.encrypted_data.len(), 256);
        assert_eq!(state.new_nonce, [3; 32]);
    }

    #[test]
    fn step3_verifies_dh_params_fail_hash() {
        let state = DhParamsRequested { nonce: [1; 16], server_nonce: [2; 16], new_nonce: [3; 32] };
        let digest = sha1!(&[3u8; 32]);
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&digest[4..]);
        let fail = enums::ServerDhParams::Fail(types::ServerDhParamsFail {
            nonce: [1; 16],
            server_nonce: [2; 16],
            new_nonce_hash: hash,
        });
        assert_eq!(do_step3(state, fail, &[0; 272], 0).unwrap_err(), Error::DhParamsFail);
    }

    #[test]
    fn step3_rejects_short_answer() {
        let state = DhParamsRequested { nonce: [1; 16], server_nonce: [2; 16], new_nonce: [3; 32] };
        let ok = enums::ServerDhParams::Ok(types::ServerDhParamsOk {
            nonce: [1; 16],
            server_nonce: [2; 16],
            encrypted_answer: vec![0; 16],
        });
        assert_eq!(
            do_step3(state, ok, &[0; 272], 0).unwrap_err(),
            Error::EncryptedResponseNotPadded { len: 16 }
        );
    }

    #[test]
    fn step3_detects_corrupted_answer() {
        let state = DhParamsRequested { nonce: [1; 16], server_nonce: [2; 16], new_nonce: [3; 32] };
        let ok = enums::ServerDhParams::Ok(types::ServerDhParamsOk {
            nonce: [1; 16],
            server_nonce: [2; 16],
            encrypted_answer: vec![0x5a; 592],
        });
        assert!(matches!(
            do_step3(state, ok, &[0; 272], 0).unwrap_err(),
            Error::InvalidDhInnerData { .. } | Error::InvalidAnswerHash { .. }
        ));
    }

    #[test]
    fn trim_be_drops_leading_zeros() {
        assert_eq!(trim_be(0x0102), vec![1, 2]);
        assert_eq!(trim_be(0), vec![0]);
    }
}
