//! Message ids, sequence numbers and the plaintext message layout.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Whether a message needs an acknowledgement.
///
/// Content-related messages (RPC calls, results, updates) carry an odd
/// `seq_no` and advance the counter; service messages (acks, containers,
/// pings answered by pongs) carry an even one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgKind {
    Content,
    Service,
}

/// Seconds since the Unix epoch, saturating at zero for clocks before 1970.
pub fn unix_secs(now: SystemTime) -> i64 {
    now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
}

/// Time component of a message id.
pub fn msg_id_secs(msg_id: i64) -> i64 {
    msg_id >> 32
}

/// Allocates client message ids.
///
/// An id is `(secs + offset) << 32 | nanos << 2`, so it is divisible by four
/// and roughly tracks the server's clock. Ids are strictly increasing: when
/// the clock has not moved past the previous id the next one is `last + 4`.
#[derive(Clone, Debug, Default)]
pub struct MessageIds {
    last: i64,
    time_offset: i32,
}

impl MessageIds {
    pub fn new(time_offset: i32) -> Self {
        Self { last: 0, time_offset }
    }

    pub fn next(&mut self) -> i64 {
        self.next_at(SystemTime::now())
    }

    /// Next id as of `now`.
    pub fn next_at(&mut self, now: SystemTime) -> i64 {
        let since = now.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        let secs = since.as_secs() as i64 + i64::from(self.time_offset);
        let mut id = (secs << 32) | (i64::from(since.subsec_nanos()) << 2);
        if id <= self.last {
            id = self.last + 4;
        }
        self.last = id;
        id
    }

    pub fn last(&self) -> i64 {
        self.last
    }

    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    /// Adopt `offset` as the new clock skew.
    ///
    /// Ids stay strictly increasing: after a backward move the next ids
    /// continue from [`last`](Self::last) until the corrected clock catches up.
    pub fn set_time_offset(&mut self, offset: i32) {
        self.time_offset = offset;
    }

    /// Server time as seen through this clock.
    pub fn corrected_secs(&self, now: SystemTime) -> i64 {
        unix_secs(now) + i64::from(self.time_offset)
    }
}

/// Allocates sequence numbers.
#[derive(Clone, Debug, Default)]
pub struct SeqNo {
    sequence: i32,
}

impl SeqNo {
    /// `2n + 1` for content messages (then `n += 1`), `2n` for service ones.
    pub fn next(&mut self, kind: MsgKind) -> i32 {
        match kind {
            MsgKind::Content => {
                let n = self.sequence * 2 + 1;
                self.sequence += 1;
                n
            }
            MsgKind::Service => self.sequence * 2,
        }
    }

    pub fn reset(&mut self) {
        self.sequence = 0;
    }
}

/// An unencrypted message, used only while no auth key exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub msg_id: i64,
    pub body: Vec<u8>,
}

/// Why a frame is not a valid plaintext message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlainError {
    /// Shorter than the 20-byte header.
    TooShort { len: usize },
    /// The frame carries an auth key id, so it is encrypted.
    NotPlaintext { auth_key_id: i64 },
    /// The declared length disagrees with the frame.
    LengthMismatch { declared: usize, actual: usize },
}

impl fmt::Display for PlainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext frame of {len} bytes is too short"),
            Self::NotPlaintext { auth_key_id } => {
                write!(f, "expected plaintext frame, got auth_key_id {auth_key_id}")
            }
            Self::LengthMismatch { declared, actual } => {
                write!(f, "plaintext frame declares {declared} body bytes but has {actual}")
            }
        }
    }
}

impl std::error::Error for PlainError {}

impl Message {
    pub fn plain(msg_id: i64, body: Vec<u8>) -> Self {
        Self { msg_id, body }
    }

    /// ```text
    /// auth_key_id:long = 0
    /// message_id:long
    /// message_data_length:int
    /// message_data:bytes
    /// ```
    pub fn to_plaintext_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 4 + self.body.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.msg_id.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    pub fn from_plaintext_bytes(frame: &[u8]) -> Result<Self, PlainError> {
        if frame.len() < 20 {
            return Err(PlainError::TooShort { len: frame.len() });
        }
        let auth_key_id = read_i64(&frame[..8]);
        if auth_key_id != 0 {
            return Err(PlainError::NotPlaintext { auth_key_id });
        }
        let msg_id = read_i64(&frame[8..16]);
        let declared = read_u32(&frame[16..20]) as usize;
        let actual = frame.len() - 20;
        if declared > actual {
            return Err(PlainError::LengthMismatch { declared, actual });
        }
        Ok(Self { msg_id, body: frame[20..20 + declared].to_vec() })
    }
}

pub(crate) fn read_i64(b: &[u8]) -> i64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[..8]);
    i64::from_le_bytes(a)
}

pub(crate) fn read_i32(b: &[u8]) -> i32 {
    let mut a = [0u8; 4];
    a.copy_from_slice(&b[..4]);
    i32::from_le_bytes(a)
}

pub(crate) fn read_u32(b: &[u8]) -> u32 {
    read_i32(b) as u32
}
