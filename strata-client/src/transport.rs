//! Async framed transport over any byte stream.
//!
//! The stream is split into a [`FrameReader`] and a [`FrameWriter`], each
//! running its own [`Framing`] from `strata-mtproto`. TCP (direct or through
//! SOCKS5) is the production stream; tests use `tokio::io::duplex`.

use std::io;

use strata_mtproto::{FrameError, Framing, TransportKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::{DisconnectReason, InvocationError};
use crate::socks5::Socks5Config;

/// Anything the client can speak MTProto over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Stream for T {}

/// Why [`FrameReader::recv`] could not produce a frame.
#[derive(Debug)]
pub enum RecvError {
    Closed,
    Io(io::Error),
    Frame(FrameError),
}

impl RecvError {
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::Closed => DisconnectReason::Closed,
            Self::Io(e) => DisconnectReason::Io(e.kind()),
            Self::Frame(e) => DisconnectReason::from(e),
        }
    }
}

impl From<RecvError> for InvocationError {
    fn from(e: RecvError) -> Self {
        match e {
            RecvError::Io(e) => Self::Io(e),
            other => Self::Disconnected(other.reason()),
        }
    }
}

pub struct FrameReader<R> {
    inner: R,
    framing: Box<dyn Framing>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, kind: TransportKind) -> Self {
        Self { inner, framing: kind.framing(), buf: Vec::new() }
    }

    /// Read until one complete payload is available.
    pub async fn recv(&mut self) -> Result<Vec<u8>, RecvError> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some(frame) = self.framing.decode(&mut self.buf).map_err(RecvError::Frame)? {
                return Ok(frame);
            }
            let n = self.inner.read(&mut chunk).await.map_err(RecvError::Io)?;
            if n == 0 {
                return Err(RecvError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

pub struct FrameWriter<W> {
    inner: W,
    framing: Box<dyn Framing>,
    out: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, kind: TransportKind) -> Self {
        Self { inner, framing: kind.framing(), out: Vec::new() }
    }

    /// Frame `payload` and write it out. The first call also sends the
    /// framing's init marker.
    pub async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.out.clear();
        self.framing
            .encode(payload, &mut self.out)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.inner.write_all(&self.out).await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Split `stream` into framed halves.
pub fn split<S: Stream>(stream: S, kind: TransportKind) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>) {
    let (r, w) = tokio::io::split(stream);
    (FrameReader::new(r, kind), FrameWriter::new(w, kind))
}

/// Dial `addr`, directly or through `proxy`.
pub async fn connect_tcp(addr: &str, proxy: Option<&Socks5Config>) -> io::Result<TcpStream> {
    let stream = match proxy {
        Some(proxy) => proxy.connect(addr).await?,
        None => TcpStream::connect(addr).await?,
    };
    stream.set_nodelay(true)?;
    debug!("[strata] tcp connected to {addr}");
    Ok(stream)
}
