//! Sans-IO transport framings.
//!
//! A [`Framing`] turns payloads into the bytes written to the stream and
//! pulls complete payloads back out of whatever has been read so far. The
//! async client owns the socket; this module only shuffles bytes.
//!
//! [MTProto transports]: https://core.telegram.org/mtproto/mtproto-transports

use std::fmt;

/// Largest payload accepted from or sent to the server.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Errors raised while framing or de-framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The server sent a bare negative status code instead of a message,
    /// e.g. `-404` (unknown auth key) or `-429` (too many connections).
    Transport(i32),
    /// A frame longer than [`MAX_FRAME`].
    TooLarge { len: usize },
    /// A payload whose length is not a multiple of four.
    Misaligned { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(code) => write!(f, "transport error {code}"),
            Self::TooLarge { len } => write!(f, "frame of {len} bytes exceeds {MAX_FRAME}"),
            Self::Misaligned { len } => write!(f, "payload of {len} bytes is not 4-byte aligned"),
        }
    }
}

impl std::error::Error for FrameError {}

/// A stream framing.
pub trait Framing: Send {
    /// Append the wire form of `payload` to `out`. The first call also
    /// writes the framing's init marker.
    fn encode(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError>;

    /// Remove one complete frame from the front of `buf` and return its
    /// payload, or `None` if more bytes are needed.
    fn decode(&mut self, buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, FrameError>;
}

/// Which framing to speak.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Abridged,
    Intermediate,
}

impl TransportKind {
    pub fn framing(self) -> Box<dyn Framing> {
        match self {
            Self::Abridged => Box::new(Abridged::new()),
            Self::Intermediate => Box::new(Intermediate::new()),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abridged" => Ok(Self::Abridged),
            "intermediate" => Ok(Self::Intermediate),
            other => Err(format!("unknown transport {other:?}")),
        }
    }
}

/// A 4-byte frame holding a negative `i32` is a status code, not a message.
fn check_status(payload: Vec<u8>) -> Result<Vec<u8>, FrameError> {
    if payload.len() == 4 {
        let code = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if code < 0 {
            return Err(FrameError::Transport(code));
        }
    }
    Ok(payload)
}

fn take_frame(buf: &mut Vec<u8>, header: usize, len: usize) -> Vec<u8> {
    let payload = buf[header..header + len].to_vec();
    buf.drain(..header + len);
    payload
}

// ─── Abridged ────────────────────────────────────────────────────────────────

/// Abridged: init byte `0xef`, then each frame is `len / 4` in one byte, or
/// `0x7f` followed by three little-endian bytes, then the payload.
#[derive(Debug, Default)]
pub struct Abridged {
    init_sent: bool,
}

impl Abridged {
    pub const INIT: u8 = 0xef;

    pub fn new() -> Self {
        Self::default()
    }
}

impl Framing for Abridged {
    fn encode(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
        if payload.len() % 4 != 0 {
            return Err(FrameError::Misaligned { len: payload.len() });
        }
        if payload.len() > MAX_FRAME {
            return Err(FrameError::TooLarge { len: payload.len() });
        }
        if !self.init_sent {
            out.push(Self::INIT);
            self.init_sent = true;
        }

        let words = payload.len() / 4;
        if words < 0x7f {
            out.push(words as u8);
        } else {
            out.push(0x7f);
            out.extend_from_slice(&(words as u32).to_le_bytes()[..3]);
        }
        out.extend_from_slice(payload);
        Ok(())
    }

    fn decode(&mut self, buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        // The top bit flags a quick ack request; it does not change the length.
        let (header, words) = if first & 0x7f == 0x7f {
            if buf.len() < 4 {
                return Ok(None);
            }
            (4, u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize)
        } else {
            (1, usize::from(first & 0x7f))
        };

        let len = words * 4;
        if len > MAX_FRAME {
            return Err(FrameError::TooLarge { len });
        }
        if buf.len() < header + len {
            return Ok(None);
        }
        check_status(take_frame(buf, header, len)).map(Some)
    }
}

// ─── Intermediate ────────────────────────────────────────────────────────────

/// Intermediate: init `0xeeeeeeee`, then each frame is a 4-byte
/// little-endian length followed by the payload.
#[derive(Debug, Default)]
pub struct Intermediate {
    init_sent: bool,
}

impl Intermediate {
    pub const INIT: [u8; 4] = [0xee; 4];

    pub fn new() -> Self {
        Self::default()
    }
}

impl Framing for Intermediate {
    fn encode(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FrameError> {
        if payload.len() > MAX_FRAME {
            return Err(FrameError::TooLarge { len: payload.len() });
        }
        if !self.init_sent {
            out.extend_from_slice(&Self::INIT);
            self.init_sent = true;
        }
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        Ok(())
    }

    fn decode(&mut self, buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, FrameError> {
        if buf.len() < 4 {
            return Ok(None);
        }
        // Top bit is the quick ack flag here too.
        let len = (u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) & 0x7fff_ffff) as usize;
        if len > MAX_FRAME {
            return Err(FrameError::TooLarge { len });
        }
        if buf.len() < 4 + len {
            return Ok(None);
        }
        check_status(take_frame(buf, 4, len)).map(Some)
    }
}
