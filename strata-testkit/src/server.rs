//! The server half of an encrypted session.

use strata_crypto::{AuthKey, DequeBuffer, Side, decrypt_data_v2_as, encrypt_data_v2_as};

/// One decrypted client message.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientMessage {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: i64,
    pub seq_no: i32,
    pub body: Vec<u8>,
}

impl ClientMessage {
    /// The body's constructor id.
    pub fn constructor_id(&self) -> Option<u32> {
        let b = self.body.get(..4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Encrypts replies and decrypts requests with a shared [`AuthKey`].
#[derive(Debug)]
pub struct EncryptedServer {
    auth_key: AuthKey,
    last_msg_id: i64,
    /// Added to the wall clock when minting message ids.
    pub clock_skew: i64,
}

impl EncryptedServer {
    pub fn new(auth_key: AuthKey) -> Self {
        Self { auth_key, last_msg_id: 0, clock_skew: 0 }
    }

    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    /// A fresh response message id (`≡ 1 mod 4`).
    pub fn next_msg_id(&mut self) -> i64 {
        let secs = crate::unix_now() + self.clock_skew;
        let mut id = (secs << 32) | 1;
        if id <= self.last_msg_id {
            id = self.last_msg_id + 4;
        }
        self.last_msg_id = id;
        id
    }

    /// Decrypt a client frame. `None` on any key or hash mismatch.
    pub fn decrypt(&self, frame: &[u8]) -> Option<ClientMessage> {
        let mut buf = frame.to_vec();
        let plain = decrypt_data_v2_as(&mut buf, &self.auth_key, Side::Client).ok()?;
        if plain.len() < 32 {
            return None;
        }
        let read_i64 = |at: usize| i64::from_le_bytes(plain[at..at + 8].try_into().unwrap_or_default());
        let len = i32::from_le_bytes(plain[28..32].try_into().unwrap_or_default());
        let len = usize::try_from(len).ok()?;
        Some(ClientMessage {
            salt: read_i64(0),
            session_id: read_i64(8),
            msg_id: read_i64(16),
            seq_no: i32::from_le_bytes(plain[24..28].try_into().unwrap_or_default()),
            body: plain.get(32..32 + len)?.to_vec(),
        })
    }

    /// Encrypt `body` as message `msg_id` for the given session.
    pub fn encrypt(&self, salt: i64, session_id: i64, msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<u8> {
        let mut buf = DequeBuffer::with_capacity(32 + body.len() + 32, 24);
        buf.extend_from_slice(&salt.to_le_bytes());
        buf.extend_from_slice(&session_id.to_le_bytes());
        buf.extend_from_slice(&msg_id.to_le_bytes());
        buf.extend_from_slice(&seq_no.to_le_bytes());
        buf.extend_from_slice(&(body.len() as i32).to_le_bytes());
        buf.extend_from_slice(body);
        let rnd: [u8; 32] = std::array::from_fn(|i| (msg_id as u8).wrapping_add(i as u8));
        encrypt_data_v2_as(&mut buf, &self.auth_key, Side::Server, &rnd);
        buf.to_vec()
    }

    /// Send `body` to the session `to` came from, with a fresh id and an odd
    /// sequence number.
    pub fn reply(&mut self, to: &ClientMessage, body: &[u8]) -> Vec<u8> {
        let msg_id = self.next_msg_id();
        self.encrypt(to.salt, to.session_id, msg_id, 1, body)
    }

    /// Like [`reply`](Self::reply) with an even sequence number.
    pub fn notify(&mut self, to: &ClientMessage, body: &[u8]) -> Vec<u8> {
        let msg_id = self.next_msg_id();
        self.encrypt(to.salt, to.session_id, msg_id, 0, body)
    }
}
