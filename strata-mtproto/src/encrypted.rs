//! Encrypted MTProto 2.0 session (after the auth key exists).
//!
//! [`EncryptedSession`] owns the per-session counters and turns message
//! bodies into ciphertext frames ([`EncryptedSession::wrap`]) and frames back
//! into validated messages ([`EncryptedSession::unwrap`]).
//!
//! Outgoing plaintext layout:
//!
//! ```text
//! salt:long session_id:long msg_id:long seq_no:int len:int body padding
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::SystemTime;

use log::{debug, warn};
use strata_crypto::{AuthKey, DequeBuffer, Side, decrypt_data_v2, encrypt_data_v2_as};
use strata_tl_types::{Identifiable, Serializable, types};

use crate::envelope::MSG_CONTAINER_ID;
use crate::message::{MessageIds, MsgKind, SeqNo, msg_id_secs, read_i32, read_i64, read_u32};
use crate::salt::SaltSet;

/// Server messages older than this (seconds, corrected clock) are rejected.
pub const MAX_PAST: i64 = 300;
/// Server messages further in the future than this are rejected.
pub const MAX_FUTURE: i64 = 30;
/// How many server message ids are remembered for replay detection.
pub const SEEN_CAPACITY: usize = 512;

const HEADER_LEN: usize = 32;

/// Errors while validating an incoming frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecryptError {
    Crypto(strata_crypto::DecryptError),
    /// The plaintext cannot hold the 32-byte inner header.
    FrameTooShort,
    /// The declared body length leaves fewer than 12 or more than 1024 bytes
    /// of padding, or is not a multiple of four.
    InvalidPadding { len: usize, padding: usize },
    SessionMismatch { got: i64, expected: i64 },
    MessageIdOutOfWindow { msg_id: i64 },
    /// Server message ids are odd.
    InvalidMessageId { msg_id: i64 },
    Duplicate { msg_id: i64 },
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::InvalidPadding { len, padding } => {
                write!(f, "body length {len} leaves {padding} bytes of padding")
            }
            Self::SessionMismatch { got, expected } => {
                write!(f, "session_id {got} does not match {expected}")
            }
            Self::MessageIdOutOfWindow { msg_id } => {
                write!(f, "msg_id {msg_id} is outside the accepted time window")
            }
            Self::InvalidMessageId { msg_id } => write!(f, "server msg_id {msg_id} is even"),
            Self::Duplicate { msg_id } => write!(f, "msg_id {msg_id} was already received"),
        }
    }
}

impl std::error::Error for DecryptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<strata_crypto::DecryptError> for DecryptError {
    fn from(e: strata_crypto::DecryptError) -> Self {
        Self::Crypto(e)
    }
}

/// Errors while building an outgoing frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WrapError {
    /// The body is not a whole number of 4-byte words, so the receiving
    /// side would reject the frame.
    Unaligned { len: usize },
    Random(getrandom::Error),
}

impl fmt::Display for WrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unaligned { len } => write!(f, "body length {len} is not a multiple of four"),
            Self::Random(e) => write!(f, "random source: {e}"),
        }
    }
}

impl std::error::Error for WrapError {}

impl From<getrandom::Error> for WrapError {
    fn from(e: getrandom::Error) -> Self {
        Self::Random(e)
    }
}

/// An encrypted frame ready for the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub msg_id: i64,
    pub seq_no: i32,
    pub bytes: Vec<u8>,
}

/// The validated inner message of a server frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub salt: i64,
    pub session_id: i64,
    pub msg_id: i64,
    pub seq_no: i32,
    pub body: Vec<u8>,
}

/// Server message ids seen recently, oldest first.
#[derive(Clone, Debug, Default)]
struct SeenIds {
    order: VecDeque<i64>,
    set: HashSet<i64>,
}

impl SeenIds {
    /// Record `id`; false if it was already present.
    fn insert(&mut self, id: i64) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.order.clear();
        self.set.clear();
    }
}

/// MTProto 2.0 session state bound to one auth key.
pub struct EncryptedSession {
    auth_key: AuthKey,
    session_id: i64,
    ids: MessageIds,
    seq: SeqNo,
    salts: SaltSet,
    seen: SeenIds,
}

fn random_i64() -> Result<i64, getrandom::Error> {
    let mut rnd = [0u8; 8];
    getrandom::getrandom(&mut rnd)?;
    Ok(i64::from_le_bytes(rnd))
}

fn secs_i32(secs: i64) -> i32 {
    secs.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn is_clock_notice(body: &[u8]) -> bool {
    body.len() >= 20
        && read_u32(&body[0..4]) == types::BadMsgNotification::CONSTRUCTOR_ID
        && matches!(read_i32(&body[16..20]), 16 | 17)
}

/// A `bad_msg_notification` with code 16 or 17 carries the server's clock,
/// so it is accepted outside the time window, bare or as an item of a
/// `msg_container`.
fn is_time_sync_notice(body: &[u8]) -> bool {
    if is_clock_notice(body) {
        return true;
    }
    if body.len() < 8 || read_u32(&body[0..4]) != MSG_CONTAINER_ID {
        return false;
    }
    let mut rest = &body[8..];
    for _ in 0..read_i32(&body[4..8]).max(0) {
        // msg_id:long seqno:int bytes:int body
        let Some(len) = rest.get(12..16).map(|b| read_u32(b) as usize) else {
            return false;
        };
        let Some(item) = rest[16..].get(..len) else {
            return false;
        };
        if is_clock_notice(item) {
            return true;
        }
        rest = &rest[16 + len..];
    }
    false
}

impl EncryptedSession {
    /// Start a session with a random id.
    pub fn new(auth_key: AuthKey, salts: SaltSet, time_offset: i32) -> Result<Self, getrandom::Error> {
        Ok(Self::with_session_id(auth_key, salts, time_offset, random_i64()?))
    }

    pub fn with_session_id(auth_key: AuthKey, salts: SaltSet, time_offset: i32, session_id: i64) -> Self {
        Self {
            auth_key,
            session_id,
            ids: MessageIds::new(time_offset),
            seq: SeqNo::default(),
            salts,
            seen: SeenIds::default(),
        }
    }

    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn time_offset(&self) -> i32 {
        self.ids.time_offset()
    }

    pub fn salts(&self) -> &SaltSet {
        &self.salts
    }

    pub fn salts_mut(&mut self) -> &mut SaltSet {
        &mut self.salts
    }

    /// Server time according to the corrected local clock.
    pub fn server_now(&self) -> i32 {
        secs_i32(self.ids.corrected_secs(SystemTime::now()))
    }

    /// Allocate a message id without sending anything.
    pub fn next_msg_id(&mut self) -> i64 {
        self.ids.next()
    }

    /// Encrypt `body` as the next message of this session.
    pub fn wrap(&mut self, body: &[u8], kind: MsgKind) -> Result<OutgoingMessage, WrapError> {
        let mut rnd = [0u8; 32];
        getrandom::getrandom(&mut rnd)?;
        self.wrap_at(body, kind, SystemTime::now(), &rnd)
    }

    /// Serialize and encrypt `call` as a content message.
    pub fn wrap_call<S: Serializable>(&mut self, call: &S) -> Result<OutgoingMessage, WrapError> {
        self.wrap(&call.to_bytes(), MsgKind::Content)
    }

    /// [`wrap`](Self::wrap) with an explicit clock and padding source.
    ///
    /// A rejected body uses up no message id or sequence number.
    pub fn wrap_at(
        &mut self,
        body: &[u8],
        kind: MsgKind,
        now: SystemTime,
        rnd: &[u8; 32],
    ) -> Result<OutgoingMessage, WrapError> {
        if body.len() % 4 != 0 {
            return Err(WrapError::Unaligned { len: body.len() });
        }
        let msg_id = self.ids.next_at(now);
        let seq_no = self.seq.next(kind);
        let salt = self.salts.current(secs_i32(self.ids.corrected_secs(now)));

        let mut buf = DequeBuffer::with_capacity(HEADER_LEN + body.len() + 32, 24);
        buf.extend(salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(msg_id.to_le_bytes());
        buf.extend(seq_no.to_le_bytes());
        buf.extend((body.len() as u32).to_le_bytes());
        buf.extend_from_slice(body);

        encrypt_data_v2_as(&mut buf, &self.auth_key, Side::Client, rnd);
        Ok(OutgoingMessage { msg_id, seq_no, bytes: buf.to_vec() })
    }

    /// Decrypt and validate a server frame.
    pub fn unwrap(&mut self, frame: &mut [u8]) -> Result<DecryptedMessage, DecryptError> {
        self.unwrap_at(frame, SystemTime::now())
    }

    /// [`unwrap`](Self::unwrap) against an explicit clock.
    pub fn unwrap_at(&mut self, frame: &mut [u8], now: SystemTime) -> Result<DecryptedMessage, DecryptError> {
        let plaintext = decrypt_data_v2(frame, &self.auth_key)?;
        if plaintext.len() < HEADER_LEN {
            return Err(DecryptError::FrameTooShort);
        }

        let salt = read_i64(&plaintext[0..8]);
        let session_id = read_i64(&plaintext[8..16]);
        let msg_id = read_i64(&plaintext[16..24]);
        let seq_no = read_i32(&plaintext[24..28]);
        let len = read_u32(&plaintext[28..32]) as usize;

        let available = plaintext.len() - HEADER_LEN;
        let padding = available.saturating_sub(len);
        if len > available || len % 4 != 0 || !(12..=1024).contains(&padding) {
            return Err(DecryptError::InvalidPadding { len, padding });
        }

        if session_id != self.session_id {
            return Err(DecryptError::SessionMismatch { got: session_id, expected: self.session_id });
        }
        if msg_id % 2 == 0 {
            return Err(DecryptError::InvalidMessageId { msg_id });
        }

        let server_secs = msg_id_secs(msg_id);
        let local = self.ids.corrected_secs(now);
        let body = &plaintext[HEADER_LEN..HEADER_LEN + len];
        if (server_secs < local - MAX_PAST || server_secs > local + MAX_FUTURE) && !is_time_sync_notice(body) {
            warn!("[strata] msg_id {msg_id} is {}s away from local time", server_secs - local);
            return Err(DecryptError::MessageIdOutOfWindow { msg_id });
        }
        if !self.seen.insert(msg_id) {
            return Err(DecryptError::Duplicate { msg_id });
        }

        Ok(DecryptedMessage { salt, session_id, msg_id, seq_no, body: body.to_vec() })
    }

    /// Adopt the server's clock from one of its message ids (bad_msg codes
    /// 16 and 17).
    ///
    /// Returns `true` when ids already issued in this session lie ahead of
    /// the corrected clock. Ids must keep increasing within a session, so
    /// the caller has to [`reset`](Self::reset) before ids from the new time
    /// base can be used.
    #[must_use]
    pub fn correct_time(&mut self, server_msg_id: i64) -> bool {
        self.correct_time_at(server_msg_id, SystemTime::now())
    }

    #[must_use]
    pub fn correct_time_at(&mut self, server_msg_id: i64, now: SystemTime) -> bool {
        let local = crate::message::unix_secs(now);
        let offset = secs_i32(msg_id_secs(server_msg_id) - local);
        debug!("[strata] clock offset {} -> {offset}", self.ids.time_offset());
        self.ids.set_time_offset(offset);
        msg_id_secs(self.ids.last()) > self.ids.corrected_secs(now)
    }

    /// Start over with a fresh random session id and zeroed counters,
    /// keeping the key, the salts and the clock offset.
    pub fn reset(&mut self) -> Result<(), getrandom::Error> {
        let id = random_i64()?;
        self.reset_with(id);
        Ok(())
    }

    pub fn reset_with(&mut self, session_id: i64) {
        debug!("[strata] new session {session_id:#x}");
        let offset = self.ids.time_offset();
        self.session_id = session_id;
        self.ids = MessageIds::new(offset);
        self.seq.reset();
        self.seen.clear();
    }
}

impl fmt::Debug for EncryptedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedSession")
            .field("auth_key", &self.auth_key)
            .field("session_id", &self.session_id)
            .field("time_offset", &self.ids.time_offset())
            .field("salts", &self.salts.len())
            .finish()
    }
}
