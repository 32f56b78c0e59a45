//! One live connection: key exchange (or resume), then reader, writer and
//! ticker tasks around a shared [`Dispatcher`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strata_crypto::AuthKey;
use strata_mtproto::{EncryptedSession, SaltSet};
use strata_tl_types::{Serializable, functions};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Config;
use crate::dispatcher::Dispatcher;
use crate::errors::{DisconnectReason, InvocationError};
use crate::handshake;
use crate::session::PersistedSession;
use crate::transport::{self, FrameReader, FrameWriter, Stream};
use crate::update::Update;

/// How many salts to ask for when the known ones run low.
const FUTURE_SALTS: i32 = 32;

pub(crate) struct Connection {
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

/// Removes the pending entry when the call future finishes or is dropped.
struct Forget<'a> {
    dispatcher: &'a Dispatcher,
    call: u64,
}

impl Drop for Forget<'_> {
    fn drop(&mut self) {
        self.dispatcher.forget(self.call);
    }
}

impl Connection {
    /// Bring `stream` up to an encrypted session, reusing `saved` when given.
    pub async fn open<S: Stream>(
        stream: S,
        config: &Config,
        saved: Option<&PersistedSession>,
        updates: mpsc::UnboundedSender<Update>,
    ) -> Result<Self, InvocationError> {
        let (mut reader, mut writer) = transport::split(stream, config.transport);

        let session = match saved {
            Some(saved) => {
                info!("[strata] resuming saved session for dc {}", saved.dc_id);
                let salts = SaltSet::from_salts(saved.salts.clone(), 0);
                EncryptedSession::new(AuthKey::from_bytes(saved.auth_key), salts, saved.time_offset)?
            }
            None => {
                info!("[strata] generating a new auth key");
                let done = tokio::time::timeout(
                    config.handshake_timeout,
                    handshake::perform(&mut reader, &mut writer, &config.rsa_keys),
                )
                .await
                .map_err(|_| InvocationError::Timeout)??;
                EncryptedSession::new(done.auth_key, SaltSet::new(done.first_salt), done.time_offset)?
            }
        };

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(session, frames_tx, updates, config.max_resends));
        let shutdown = CancellationToken::new();

        tokio::spawn(write_loop(writer, frames_rx, Arc::clone(&dispatcher), shutdown.clone()));
        tokio::spawn(read_loop(reader, Arc::clone(&dispatcher), shutdown.clone()));
        tokio::spawn(tick_loop(
            Arc::clone(&dispatcher),
            config.ack_interval,
            config.request_timeout,
            shutdown.clone(),
        ));

        Ok(Self { dispatcher, shutdown })
    }

    /// Send `body` and wait for its answer, the deadline or `cancel`.
    pub async fn invoke_raw(
        &self,
        body: Vec<u8>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<u8>, InvocationError> {
        let ticket = self.dispatcher.send(body)?;
        let _forget = Forget { dispatcher: &self.dispatcher, call: ticket.call };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            reply = ticket.rx => reply.unwrap_or_else(|_| {
                let reason = self.dispatcher.closed().unwrap_or(DisconnectReason::Closed);
                Err(InvocationError::Disconnected(reason))
            }),
            _ = tokio::time::sleep(timeout) => {
                debug!("[strata] msg {} timed out after {timeout:?}", ticket.msg_id);
                Err(InvocationError::Timeout)
            }
            _ = cancelled => {
                debug!("[strata] msg {} cancelled", ticket.msg_id);
                Err(InvocationError::Cancelled)
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn shutdown(&self) {
        self.dispatcher.disconnect(DisconnectReason::Shutdown);
        self.shutdown.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(e) = writer.send(&frame).await {
            warn!("[strata] write failed: {e}");
            dispatcher.disconnect(DisconnectReason::Io(e.kind()));
            shutdown.cancel();
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            frame = reader.recv() => frame,
        };
        let outcome = frame
            .map_err(|e| e.reason())
            .and_then(|frame| dispatcher.handle_frame(frame));
        if let Err(reason) = outcome {
            info!("[strata] connection lost: {reason}");
            dispatcher.disconnect(reason);
            shutdown.cancel();
            return;
        }
    }
}

/// Flush acks every `period` and fetch salts when they run low.
async fn tick_loop(
    dispatcher: Arc<Dispatcher>,
    period: Duration,
    request_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let refreshing = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if let Err(e) = dispatcher.flush_acks() {
            debug!("[strata] ack flush failed: {e}");
        }

        if !dispatcher.salts_need_refresh() || refreshing.swap(true, Ordering::AcqRel) {
            continue;
        }
        let ticket = match dispatcher.send(functions::GetFutureSalts { num: FUTURE_SALTS }.to_bytes()) {
            Ok(ticket) => ticket,
            Err(e) => {
                debug!("[strata] get_future_salts not sent: {e}");
                refreshing.store(false, Ordering::Release);
                continue;
            }
        };
        let dispatcher = Arc::clone(&dispatcher);
        let refreshing = Arc::clone(&refreshing);
        tokio::spawn(async move {
            // The dispatcher stores the salts itself; this only bounds the wait.
            if tokio::time::timeout(request_timeout, ticket.rx).await.is_err() {
                dispatcher.forget(ticket.call);
            }
            refreshing.store(false, Ordering::Release);
        });
    }
}
