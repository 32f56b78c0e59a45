//! Server-side framing and plaintext messages.

/// Frames written by the server. The server never sends an init marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    Abridged,
    Intermediate,
}

impl Framing {
    pub fn encode(self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 4);
        match self {
            Self::Abridged => {
                let words = payload.len() / 4;
                if words < 0x7f {
                    out.push(words as u8);
                } else {
                    out.push(0x7f);
                    out.extend_from_slice(&(words as u32).to_le_bytes()[..3]);
                }
            }
            Self::Intermediate => out.extend_from_slice(&(payload.len() as u32).to_le_bytes()),
        }
        out.extend_from_slice(payload);
        out
    }
}

/// Reassembles client frames from arbitrary chunks, detecting the framing
/// from the init marker.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
    framing: Option<Framing>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The framing announced by the client, once seen.
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// The next complete payload, if one has arrived.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let framing = match self.framing {
            Some(f) => f,
            None => {
                let framing = match self.buf.first()? {
                    0xef => {
                        self.buf.remove(0);
                        Framing::Abridged
                    }
                    _ if self.buf.len() >= 4 && self.buf[..4] == [0xee; 4] => {
                        self.buf.drain(..4);
                        Framing::Intermediate
                    }
                    _ => return None,
                };
                self.framing = Some(framing);
                framing
            }
        };

        let (header, len) = match framing {
            Framing::Abridged => {
                let first = *self.buf.first()?;
                if first == 0x7f {
                    if self.buf.len() < 4 {
                        return None;
                    }
                    (4, u32::from_le_bytes([self.buf[1], self.buf[2], self.buf[3], 0]) as usize * 4)
                } else {
                    (1, usize::from(first) * 4)
                }
            }
            Framing::Intermediate => {
                if self.buf.len() < 4 {
                    return None;
                }
                (4, u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize)
            }
        };
        if self.buf.len() < header + len {
            return None;
        }
        let payload = self.buf[header..header + len].to_vec();
        self.buf.drain(..header + len);
        Some(payload)
    }
}

/// `auth_key_id = 0 ‖ msg_id ‖ length ‖ body`.
pub fn plain_message(msg_id: i64, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(20 + body.len());
    out.extend_from_slice(&0i64.to_le_bytes());
    out.extend_from_slice(&msg_id.to_le_bytes());
    out.extend_from_slice(&(body.len() as i32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Split a plaintext message into `(msg_id, body)`.
pub fn parse_plain(frame: &[u8]) -> Option<(i64, &[u8])> {
    if frame.len() < 20 || frame[..8] != [0; 8] {
        return None;
    }
    let msg_id = i64::from_le_bytes(frame[8..16].try_into().ok()?);
    let len = i32::from_le_bytes(frame[16..20].try_into().ok()?);
    let body = frame.get(20..20 + usize::try_from(len).ok()?)?;
    Some((msg_id, body))
}
