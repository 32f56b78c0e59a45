//! Correlates requests and responses over one encrypted session.
//!
//! The [`Dispatcher`] is shared by every caller and by the connection's
//! reader task. Two locks guard it, always taken in this order:
//!
//! 1. the [`EncryptedSession`] (message ids, sequence numbers, salts),
//! 2. the request table (pending calls, queued acks, closed flag).
//!
//! Frames are queued on the writer channel while both are held, so the wire
//! order matches the order in which message ids were allocated.

use std::collections::HashMap;
use std::{fmt, io};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use strata_crypto::AuthKey;
use strata_mtproto::envelope::{self, Envelope, Incoming};
use strata_mtproto::{DecryptError, EncryptedSession, MsgKind, ServerSalt};
use strata_tl_types::{Serializable, enums, types};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::{DisconnectReason, InvocationError, RpcError};
use crate::update::Update;

/// Consecutive frames that may fail to decrypt or decode before the
/// connection is considered compromised.
pub const MAX_INTEGRITY_FAILURES: u32 = 3;

pub(crate) type Reply = Result<Vec<u8>, InvocationError>;

struct Pending {
    tx: oneshot::Sender<Reply>,
    /// Serialized request, kept for resends.
    body: Vec<u8>,
    resends: u32,
    /// Stays the same across resends, unlike the msg_id key.
    call: u64,
}

#[derive(Default)]
struct Table {
    requests: HashMap<i64, Pending>,
    acks: Vec<i64>,
    closed: Option<DisconnectReason>,
    next_call: u64,
}

/// One request on its way to the server.
pub(crate) struct Ticket {
    pub msg_id: i64,
    pub call: u64,
    pub rx: oneshot::Receiver<Reply>,
}

pub(crate) struct Dispatcher {
    session: Mutex<EncryptedSession>,
    table: Mutex<Table>,
    writer: mpsc::UnboundedSender<Vec<u8>>,
    updates: mpsc::UnboundedSender<Update>,
    max_resends: u32,
    integrity_failures: AtomicU32,
}

/// Lock, ignoring poisoning.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn constructor_of(body: &[u8]) -> u32 {
    body.get(..4).map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl Dispatcher {
    pub fn new(
        session: EncryptedSession,
        writer: mpsc::UnboundedSender<Vec<u8>>,
        updates: mpsc::UnboundedSender<Update>,
        max_resends: u32,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            table: Mutex::new(Table::default()),
            writer,
            updates,
            max_resends,
            integrity_failures: AtomicU32::new(0),
        }
    }

    // ── Outgoing ───────────────────────────────────────────────────────────

    /// Encrypt `body` as a new content message and register it as pending.
    /// Queued acks go out first, as their own service message.
    pub fn send(&self, body: Vec<u8>) -> Result<Ticket, InvocationError> {
        let mut session = lock(&self.session);
        let mut table = lock(&self.table);
        if let Some(reason) = &table.closed {
            return Err(InvocationError::Disconnected(reason.clone()));
        }
        self.write_acks(&mut session, &mut table)?;

        let out = session.wrap(&body, MsgKind::Content)?;
        self.writer
            .send(out.bytes)
            .map_err(|_| InvocationError::Disconnected(DisconnectReason::Closed))?;
        debug!("[strata] -> {:#010x} as msg {}", constructor_of(&body), out.msg_id);

        let (tx, rx) = oneshot::channel();
        table.next_call += 1;
        let call = table.next_call;
        table.requests.insert(out.msg_id, Pending { tx, body, resends: 0, call });
        Ok(Ticket { msg_id: out.msg_id, call, rx })
    }

    /// Send queued acks now, if there are any.
    pub fn flush_acks(&self) -> Result<(), InvocationError> {
        let mut session = lock(&self.session);
        let mut table = lock(&self.table);
        if table.closed.is_some() {
            return Ok(());
        }
        self.write_acks(&mut session, &mut table)
    }

    fn write_acks(&self, session: &mut EncryptedSession, table: &mut Table) -> Result<(), InvocationError> {
        if table.acks.is_empty() {
            return Ok(());
        }
        let msg_ids = std::mem::take(&mut table.acks);
        debug!("[strata] acking {} messages", msg_ids.len());
        let body = enums::MsgsAck::MsgsAck(types::MsgsAck { msg_ids }).to_bytes();
        let out = session.wrap(&body, MsgKind::Service)?;
        self.writer
            .send(out.bytes)
            .map_err(|_| InvocationError::Disconnected(DisconnectReason::Closed))
    }

    /// Drop the pending entry for `call`, wherever it currently lives.
    pub fn forget(&self, call: u64) {
        lock(&self.table).requests.retain(|_, p| p.call != call);
    }

    /// Re-send a pending request under a fresh msg_id, or fail it once it
    /// has been resent `max_resends` times.
    fn resend(&self, session: &mut EncryptedSession, table: &mut Table, bad_msg_id: i64, code: i32) {
        let Some(pending) = table.requests.remove(&bad_msg_id) else {
            debug!("[strata] bad_msg {code} for {bad_msg_id}, which is not pending");
            return;
        };
        if pending.resends >= self.max_resends {
            warn!("[strata] giving up on msg {bad_msg_id} after {} resends (code {code})", pending.resends);
            let _ = pending.tx.send(Err(InvocationError::BadMessage { code }));
            return;
        }
        warn!("[strata] resending msg {bad_msg_id} (code {code})");
        self.requeue(session, table, bad_msg_id, Pending { resends: pending.resends + 1, ..pending });
    }

    /// Wrap `pending` again in the current session and queue it.
    fn requeue(&self, session: &mut EncryptedSession, table: &mut Table, old_msg_id: i64, pending: Pending) {
        let out = match session.wrap(&pending.body, MsgKind::Content) {
            Ok(out) => out,
            Err(e) => {
                let _ = pending.tx.send(Err(e.into()));
                return;
            }
        };
        debug!("[strata] msg {old_msg_id} is now msg {}", out.msg_id);
        if self.writer.send(out.bytes).is_err() {
            let _ = pending.tx.send(Err(InvocationError::Disconnected(DisconnectReason::Closed)));
            return;
        }
        table.requests.insert(out.msg_id, pending);
    }

    /// Start a new session after the clock moved backwards and carry every
    /// pending request except `bad_msg_id` over to it, oldest first.
    fn restart_session(
        &self,
        session: &mut EncryptedSession,
        table: &mut Table,
        bad_msg_id: i64,
    ) -> Result<(), DisconnectReason> {
        session.reset().map_err(|e| {
            warn!("[strata] cannot start a new session: {e}");
            DisconnectReason::Io(io::ErrorKind::Other)
        })?;
        info!("[strata] clock moved backwards, continuing in session {:#x}", session.session_id());
        // Acks name messages of the old session.
        table.acks.clear();

        let mut ids: Vec<i64> = table.requests.keys().copied().filter(|id| *id != bad_msg_id).collect();
        ids.sort_unstable();
        let carried: Vec<(i64, Pending)> =
            ids.into_iter().filter_map(|id| table.requests.remove(&id).map(|p| (id, p))).collect();
        for (msg_id, pending) in carried {
            self.requeue(session, table, msg_id, pending);
        }
        Ok(())
    }

    // ── Incoming ───────────────────────────────────────────────────────────

    /// Process one frame from the server. An error means the connection
    /// must be torn down.
    pub fn handle_frame(&self, mut frame: Vec<u8>) -> Result<(), DisconnectReason> {
        let decrypted = lock(&self.session).unwrap(&mut frame);
        let message = match decrypted {
            Ok(message) => message,
            Err(e @ (DecryptError::Crypto(_) | DecryptError::FrameTooShort | DecryptError::InvalidPadding { .. })) => {
                return self.integrity_failure(format_args!("dropping frame: {e}"));
            }
            Err(e) => {
                warn!("[strata] dropping frame: {e}");
                return Ok(());
            }
        };

        let incoming = match envelope::decode(message.msg_id, message.seq_no, message.body) {
            Ok(incoming) => incoming,
            Err(e) => return self.integrity_failure(format_args!("undecodable message {}: {e}", message.msg_id)),
        };
        self.integrity_failures.store(0, Ordering::Relaxed);

        let mut session = lock(&self.session);
        let mut table = lock(&self.table);
        for item in incoming {
            self.dispatch(&mut session, &mut table, item)?;
        }
        Ok(())
    }

    /// Count one more bad frame in a row. Reaching
    /// [`MAX_INTEGRITY_FAILURES`] tears the connection down.
    fn integrity_failure(&self, what: fmt::Arguments<'_>) -> Result<(), DisconnectReason> {
        let failures = self.integrity_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("[strata] {what} ({failures} in a row)");
        if failures >= MAX_INTEGRITY_FAILURES {
            return Err(DisconnectReason::Integrity);
        }
        Ok(())
    }

    fn dispatch(&self, session: &mut EncryptedSession, table: &mut Table, msg: Incoming) -> Result<(), DisconnectReason> {
        if msg.needs_ack() {
            table.acks.push(msg.msg_id);
        }

        match msg.envelope {
            Envelope::RpcResult { req_msg_id, result } => {
                let Some(pending) = table.requests.remove(&req_msg_id) else {
                    debug!("[strata] result for unknown msg {req_msg_id}");
                    return Ok(());
                };
                let reply = result.map_err(|e| InvocationError::Rpc(RpcError::from(e)));
                if let Err(e) = &reply {
                    debug!("[strata] msg {req_msg_id} failed: {e}");
                }
                let _ = pending.tx.send(reply);
            }
            Envelope::Pong(pong) => {
                if let Some(pending) = table.requests.remove(&pong.msg_id) {
                    let _ = pending.tx.send(Ok(msg.body));
                }
            }
            Envelope::FutureSalts(salts) => {
                let now = salts.now;
                let fresh = salts.salts.0.iter().map(|s| ServerSalt {
                    salt: s.salt,
                    valid_since: s.valid_since,
                    valid_until: s.valid_until,
                });
                session.salts_mut().extend(fresh, now);
                debug!("[strata] {} salts known", session.salts().len());
                if let Some(pending) = table.requests.remove(&salts.req_msg_id) {
                    let _ = pending.tx.send(Ok(msg.body));
                }
            }
            Envelope::BadServerSalt(bad) => {
                debug!("[strata] bad_server_salt, adopting {:#x}", bad.new_server_salt);
                session.salts_mut().replace(bad.new_server_salt);
                self.resend(session, table, bad.bad_msg_id, bad.error_code);
            }
            Envelope::BadMsg(bad) => match bad.error_code {
                16 | 17 => {
                    if session.correct_time(msg.msg_id) {
                        self.restart_session(session, table, bad.bad_msg_id)?;
                    }
                    self.resend(session, table, bad.bad_msg_id, bad.error_code);
                }
                18 | 19 | 20 | 48 => self.resend(session, table, bad.bad_msg_id, bad.error_code),
                32 | 33 => {
                    warn!("[strata] bad_msg {} for msg {}: session is unusable", bad.error_code, bad.bad_msg_id);
                    return Err(DisconnectReason::SessionInvalidated { code: bad.error_code });
                }
                code => {
                    if let Some(pending) = table.requests.remove(&bad.bad_msg_id) {
                        let _ = pending.tx.send(Err(InvocationError::BadMessage { code }));
                    }
                }
            },
            Envelope::NewSessionCreated(created) => {
                info!("[strata] server created a new session, first msg {}", created.first_msg_id);
                session.salts_mut().replace(created.server_salt);
            }
            Envelope::MsgsAck(ack) => debug!("[strata] server acked {:?}", ack.msg_ids),
            Envelope::DetailedInfo(_) | Envelope::DestroySession(_) => {
                debug!("[strata] ignoring service message {}", msg.msg_id);
            }
            Envelope::Other { constructor_id } => {
                let update = Update { msg_id: msg.msg_id, constructor_id, body: msg.body };
                // Nobody listening is fine.
                let _ = self.updates.send(update);
            }
        }
        Ok(())
    }

    /// Fail every pending call and refuse new ones. Only the first reason
    /// sticks.
    pub fn disconnect(&self, reason: DisconnectReason) {
        let mut table = lock(&self.table);
        let reason = table.closed.get_or_insert(reason).clone();
        if !table.requests.is_empty() {
            info!("[strata] disconnected ({reason}), failing {} pending calls", table.requests.len());
        }
        for (_, pending) in table.requests.drain() {
            let _ = pending.tx.send(Err(InvocationError::Disconnected(reason.clone())));
        }
        table.acks.clear();
    }

    // ── Inspection ─────────────────────────────────────────────────────────

    pub fn closed(&self) -> Option<DisconnectReason> {
        lock(&self.table).closed.clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.table).requests.len()
    }

    pub fn salts_need_refresh(&self) -> bool {
        let session = lock(&self.session);
        session.salts().needs_refresh(session.server_now())
    }

    /// Key, clock offset and salts, for persistence.
    pub fn snapshot(&self) -> (AuthKey, i32, Vec<ServerSalt>) {
        let session = lock(&self.session);
        (session.auth_key().clone(), session.time_offset(), session.salts().as_slice().to_vec())
    }

    pub fn session_id(&self) -> i64 {
        lock(&self.session).session_id()
    }

    pub fn current_salt(&self) -> i64 {
        let session = lock(&self.session);
        session.salts().current(session.server_now())
    }
}
