//! Error types for strata-client.

use std::{fmt, io};

use strata_mtproto::authentication;
use strata_mtproto::encrypted::WrapError;
use strata_mtproto::transport::FrameError;
use strata_tl_types::{deserialize, types};

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error the server returned for one call.
///
/// Numeric suffixes are stripped from the name and placed in
/// [`RpcError::value`]: `FLOOD_WAIT_30` becomes
/// `RpcError { code: 420, name: "FLOOD_WAIT", value: Some(30) }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE, digits removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl From<types::RpcError> for RpcError {
    fn from(e: types::RpcError) -> Self {
        Self::parse(e.error_code, &e.error_message)
    }
}

impl RpcError {
    /// Split a raw message like `"FLOOD_WAIT_30"` into name and value.
    pub fn parse(code: i32, message: &str) -> Self {
        if let Some((name, suffix)) = message.rsplit_once('_') {
            if !suffix.is_empty() && suffix.bytes().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    return Self { code, name: name.to_owned(), value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_owned(), value: None }
    }

    /// Match on the name, with an optional leading or trailing `*`.
    ///
    /// - `err.is("FLOOD_WAIT")` exact
    /// - `err.is("PHONE_CODE_*")` prefix
    /// - `err.is("*_INVALID")` suffix
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// Seconds to wait, if this is a `FLOOD_WAIT_<n>`.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value.map(u64::from)
        } else {
            None
        }
    }

    /// The server no longer recognises the auth key.
    pub fn is_auth_key_invalid(&self) -> bool {
        self.code == 401 && (self.is("AUTH_KEY_UNREGISTERED") || self.is("AUTH_KEY_INVALID"))
    }

    pub fn is_password_needed(&self) -> bool {
        self.code == 401 && self.name == "SESSION_PASSWORD_NEEDED"
    }
}

// ─── DisconnectReason ─────────────────────────────────────────────────────────

/// Why a connection stopped. Shared by every call that was in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the stream.
    Closed,
    /// Reading or writing failed.
    Io(io::ErrorKind),
    /// The server sent a transport error code such as `-404`.
    Transport(i32),
    /// Oversized or misaligned frames.
    Framing,
    /// Too many frames in a row failed to decrypt or verify.
    Integrity,
    /// `bad_msg_notification` 32/33: the session is beyond repair.
    SessionInvalidated { code: i32 },
    /// The client shut the connection down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::Transport(code) => write!(f, "transport error {code}"),
            Self::Framing => write!(f, "framing error"),
            Self::Integrity => write!(f, "repeated integrity failures"),
            Self::SessionInvalidated { code } => write!(f, "session invalidated (bad_msg {code})"),
            Self::Shutdown => write!(f, "client shut down"),
        }
    }
}

impl From<&FrameError> for DisconnectReason {
    fn from(e: &FrameError) -> Self {
        match e {
            FrameError::Transport(code) => Self::Transport(*code),
            FrameError::TooLarge { .. } | FrameError::Misaligned { .. } => Self::Framing,
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error returned from any `Client` method that talks to the server.
#[derive(Debug)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Dialing or the stream failed.
    Io(io::Error),
    /// The response did not match the expected type.
    Deserialize(deserialize::Error),
    /// Auth key generation failed.
    Handshake(authentication::Error),
    /// No answer before the deadline.
    Timeout,
    /// Cancelled through [`crate::CallOptions::cancel`].
    Cancelled,
    /// The server refused the message with a `bad_msg_notification` that
    /// could not be recovered from.
    BadMessage { code: i32 },
    /// The connection went away while the call was pending.
    Disconnected(DisconnectReason),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Deserialize(e) => write!(f, "deserialize error: {e}"),
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Cancelled => write!(f, "request cancelled"),
            Self::BadMessage { code } => write!(f, "server rejected the message (bad_msg {code})"),
            Self::Disconnected(reason) => write!(f, "disconnected: {reason}"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Deserialize(e) => Some(e),
            Self::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<deserialize::Error> for InvocationError {
    fn from(e: deserialize::Error) -> Self {
        Self::Deserialize(e)
    }
}

impl From<authentication::Error> for InvocationError {
    fn from(e: authentication::Error) -> Self {
        Self::Handshake(e)
    }
}

impl From<getrandom::Error> for InvocationError {
    fn from(e: getrandom::Error) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl From<WrapError> for InvocationError {
    fn from(e: WrapError) -> Self {
        match e {
            WrapError::Random(e) => e.into(),
            e @ WrapError::Unaligned { .. } => Self::Io(io::Error::new(io::ErrorKind::InvalidInput, e.to_string())),
        }
    }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

impl InvocationError {
    /// `true` if this is the named RPC error (supports `*` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _ => false,
        }
    }

    /// If this is a FLOOD_WAIT error, how many seconds to wait.
    pub fn flood_wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Rpc(e) => e.flood_wait_seconds(),
            _ => None,
        }
    }

    /// `true` when the connection is gone and the caller should reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_numeric_suffix() {
        let e = RpcError::parse(420, "FLOOD_WAIT_30");
        assert_eq!(e, RpcError { code: 420, name: "FLOOD_WAIT".into(), value: Some(30) });
        assert_eq!(e.flood_wait_seconds(), Some(30));

        let e = RpcError::parse(400, "PEER_ID_INVALID");
        assert_eq!(e.value, None);
        assert_eq!(e.name, "PEER_ID_INVALID");
        assert_eq!(e.flood_wait_seconds(), None);
    }

    #[test]
    fn wildcards() {
        let e = RpcError::parse(400, "PHONE_CODE_EXPIRED");
        assert!(e.is("PHONE_CODE_*"));
        assert!(e.is("*_EXPIRED"));
        assert!(!e.is("PHONE_CODE"));
    }

    #[test]
    fn auth_and_password_helpers() {
        assert!(RpcError::parse(401, "AUTH_KEY_UNREGISTERED").is_auth_key_invalid());
        assert!(RpcError::parse(401, "SESSION_PASSWORD_NEEDED").is_password_needed());
        assert!(!RpcError::parse(400, "SESSION_PASSWORD_NEEDED").is_password_needed());
    }

    #[test]
    fn converts_from_the_wire_type() {
        let wire = types::RpcError { error_code: 420, error_message: "FLOOD_WAIT_5".into() };
        let e: InvocationError = RpcError::from(wire).into();
        assert_eq!(e.flood_wait_seconds(), Some(5));
        assert!(e.is("FLOOD_*"));
        assert!(!e.is_disconnect());
    }
}
