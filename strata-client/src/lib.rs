//! # strata-client
//!
//! Async MTProto client core.
//!
//! ## Features
//! - Auth key generation over a plaintext session, or resume from a saved key
//! - Many concurrent RPCs over one connection, correlated by message id
//! - Acks, server salt rotation, clock resync and bounded resends handled
//!   transparently
//! - Per-call timeouts and cancellation
//! - `FLOOD_WAIT` auto-retry with configurable policy
//! - Unsolicited messages delivered as [`Update`]s
//! - Session persistence through a pluggable [`SessionBackend`]
//! - Abridged or Intermediate framing, directly or through SOCKS5
//!
//! ```rust,no_run
//! # async fn f() -> Result<(), strata_client::InvocationError> {
//! use strata_client::{Client, Config};
//!
//! let client = Client::connect(Config::default()).await?;
//! let pong = client.ping().await?;
//! println!("pong for {}", pong.ping_id);
//! client.save_session()?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod connection;
mod dispatcher;
mod errors;
mod handshake;
mod retry;
mod session;
pub mod session_backend;
pub mod socks5;
pub mod transport;
pub mod update;

pub use errors::{DisconnectReason, InvocationError, RpcError};
pub use handshake::MAX_DH_ATTEMPTS;
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use session::PersistedSession;
pub use session_backend::{BinaryFileBackend, InMemoryBackend, SessionBackend};
pub use socks5::Socks5Config;
pub use strata_mtproto::TransportKind;
pub use tokio_util::sync::CancellationToken;
pub use update::Update;

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use connection::Connection;
use strata_crypto::rsa;
use strata_mtproto::authentication;
use strata_tl_types::{self as tl, Deserializable, RemoteCall};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Parameters sent in `initConnection` right after connecting.
#[derive(Clone, Debug)]
pub struct InitParams {
    pub api_id:           i32,
    pub device_model:     String,
    pub system_version:   String,
    pub app_version:      String,
    pub system_lang_code: String,
    pub lang_pack:        String,
    pub lang_code:        String,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            api_id:           0,
            device_model:     std::env::consts::OS.to_string(),
            system_version:   "1.0".to_string(),
            app_version:      env!("CARGO_PKG_VERSION").to_string(),
            system_lang_code: "en".to_string(),
            lang_pack:        String::new(),
            lang_code:        "en".to_string(),
        }
    }
}

/// Configuration for [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    /// Server address, `host:port`. A saved session's address wins.
    pub addr:              String,
    pub dc_id:             i32,
    /// Framing spoken on the stream (default: Abridged).
    pub transport:         TransportKind,
    /// Public keys accepted during key exchange.
    pub rsa_keys:          Vec<rsa::Key>,
    pub handshake_timeout: Duration,
    /// Default per-call deadline; see [`CallOptions::timeout`].
    pub request_timeout:   Duration,
    /// How often queued acks are flushed when no request carries them.
    pub ack_interval:      Duration,
    /// Resends allowed per request for recoverable `bad_msg_notification`s.
    pub max_resends:       u32,
    pub retry_policy:      Arc<dyn RetryPolicy>,
    /// Session persistence backend (default: in memory).
    pub session_backend:   Arc<dyn SessionBackend>,
    /// Optional SOCKS5 proxy for [`Client::connect`].
    pub proxy:             Option<Socks5Config>,
    /// Wrap the first call in `invokeWithLayer(initConnection(..))`.
    pub init:              Option<InitParams>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr:              "149.154.167.51:443".to_string(),
            dc_id:             2,
            transport:         TransportKind::Abridged,
            rsa_keys:          authentication::default_keys(),
            handshake_timeout: Duration::from_secs(15),
            request_timeout:   Duration::from_secs(10),
            ack_interval:      Duration::from_secs(5),
            max_resends:       3,
            retry_policy:      Arc::new(AutoSleep::default()),
            session_backend:   Arc::new(InMemoryBackend::new()),
            proxy:             None,
            init:              None,
        }
    }
}

/// Per-call overrides for [`Client::invoke_with`].
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Overrides [`Config::request_timeout`].
    pub timeout: Option<Duration>,
    /// Cancelling the token fails the call with
    /// [`InvocationError::Cancelled`].
    pub cancel:  Option<CancellationToken>,
}

// ─── Client ───────────────────────────────────────────────────────────────────

struct ClientInner {
    config:  Config,
    conn:    Mutex<Arc<Connection>>,
    updates: mpsc::UnboundedSender<Update>,
    updates_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Update>>,
}

/// A connected MTProto client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────────

    /// Dial `config.addr` (or the saved session's address) and bring up an
    /// encrypted session, resuming a saved key when there is one.
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let saved = Self::load_saved(&config)?;
        let addr = saved.as_ref().map_or_else(|| config.addr.clone(), |s| s.addr.clone());
        let stream = transport::connect_tcp(&addr, config.proxy.as_ref()).await?;

        if saved.is_none() {
            return Self::start(config, stream, None).await;
        }
        match Self::start(config.clone(), stream, saved).await {
            Ok(client) => Ok(client),
            Err(e) if key_rejected(&e) => {
                warn!("[strata] saved auth key rejected ({e}), generating a new one");
                config.session_backend.delete()?;
                let stream = transport::connect_tcp(&config.addr, config.proxy.as_ref()).await?;
                Self::start(config, stream, None).await
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`connect`](Self::connect) over a stream the caller opened.
    pub async fn connect_with_stream<S: transport::Stream>(config: Config, stream: S) -> Result<Self, InvocationError> {
        let saved = Self::load_saved(&config)?;
        Self::start(config, stream, saved).await
    }

    fn load_saved(config: &Config) -> Result<Option<PersistedSession>, InvocationError> {
        let saved = config.session_backend.load()?;
        Ok(saved.filter(|s| s.dc_id == config.dc_id))
    }

    async fn start<S: transport::Stream>(
        config: Config,
        stream: S,
        saved: Option<PersistedSession>,
    ) -> Result<Self, InvocationError> {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let conn = Connection::open(stream, &config, saved.as_ref(), updates.clone()).await?;
        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                conn: Mutex::new(Arc::new(conn)),
                updates,
                updates_rx: tokio::sync::Mutex::new(updates_rx),
            }),
        };

        if let Some(init) = client.inner.config.init.clone() {
            client.init_connection(&init).await?;
        }
        if saved.is_none() {
            client.save_session()?;
        }
        info!("[strata] connected (dc {})", client.inner.config.dc_id);
        Ok(client)
    }

    /// Reconnect to the same server with the current auth key and a fresh
    /// session id.
    pub async fn reconnect(&self) -> Result<(), InvocationError> {
        let config = &self.inner.config;
        let saved = self.persisted();
        let stream = transport::connect_tcp(&saved.addr, config.proxy.as_ref()).await?;
        self.reconnect_with(stream).await
    }

    /// Like [`reconnect`](Self::reconnect) over a stream the caller opened.
    pub async fn reconnect_with<S: transport::Stream>(&self, stream: S) -> Result<(), InvocationError> {
        let saved = self.persisted();
        let conn = Connection::open(stream, &self.inner.config, Some(&saved), self.inner.updates.clone()).await?;
        let old = std::mem::replace(&mut *self.lock_conn(), Arc::new(conn));
        old.shutdown();
        if let Some(init) = self.inner.config.init.clone() {
            self.init_connection(&init).await?;
        }
        info!("[strata] reconnected");
        Ok(())
    }

    /// Close the connection. Pending and later calls fail with
    /// [`DisconnectReason::Shutdown`].
    pub fn disconnect(&self) {
        self.conn().shutdown();
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Arc<Connection>> {
        self.inner.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn conn(&self) -> Arc<Connection> {
        Arc::clone(&self.lock_conn())
    }

    // ── Session ────────────────────────────────────────────────────────────

    /// The state needed to resume later.
    pub fn persisted(&self) -> PersistedSession {
        let (auth_key, time_offset, salts) = self.conn().dispatcher().snapshot();
        PersistedSession {
            dc_id: self.inner.config.dc_id,
            addr: self.inner.config.addr.clone(),
            auth_key: auth_key.to_bytes(),
            time_offset,
            salts,
        }
    }

    pub fn save_session(&self) -> Result<(), InvocationError> {
        let backend = &self.inner.config.session_backend;
        backend.save(&self.persisted())?;
        info!("[strata] session saved ({})", backend.name());
        Ok(())
    }

    // ── RPC ────────────────────────────────────────────────────────────────

    pub async fn invoke<R: RemoteCall>(&self, req: &R) -> Result<R::Return, InvocationError> {
        self.invoke_with(req, &CallOptions::default()).await
    }

    /// Send `req` and decode its answer, retrying per the configured
    /// [`RetryPolicy`].
    pub async fn invoke_with<R: RemoteCall>(&self, req: &R, opts: &CallOptions) -> Result<R::Return, InvocationError> {
        let body = req.to_bytes();
        let mut fail_count   = NonZeroU32::MIN;
        let mut slept_so_far = Duration::default();
        loop {
            match self.invoke_raw(body.clone(), opts).await {
                Ok(answer) => return Ok(R::Return::from_bytes(&answer)?),
                Err(e) => {
                    let ctx = RetryContext { fail_count, slept_so_far, error: e };
                    match self.inner.config.retry_policy.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            sleep(delay).await;
                            slept_so_far += delay;
                            fail_count = fail_count.saturating_add(1);
                        }
                        ControlFlow::Break(()) => return Err(ctx.error),
                    }
                }
            }
        }
    }

    /// Send an already serialized request once and return the raw answer.
    pub async fn invoke_raw(&self, body: Vec<u8>, opts: &CallOptions) -> Result<Vec<u8>, InvocationError> {
        let timeout = opts.timeout.unwrap_or(self.inner.config.request_timeout);
        self.conn().invoke_raw(body, timeout, opts.cancel.as_ref()).await
    }

    pub async fn ping(&self) -> Result<tl::types::Pong, InvocationError> {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd)?;
        let tl::enums::Pong::Pong(pong) = self.invoke(&tl::functions::Ping { ping_id: i64::from_le_bytes(rnd) }).await?;
        Ok(pong)
    }

    /// Ask for up to `num` upcoming salts. They are also stored for use.
    pub async fn get_future_salts(&self, num: i32) -> Result<tl::types::FutureSalts, InvocationError> {
        let tl::enums::FutureSalts::FutureSalts(salts) = self.invoke(&tl::functions::GetFutureSalts { num }).await?;
        Ok(salts)
    }

    async fn init_connection(&self, init: &InitParams) -> Result<(), InvocationError> {
        use tl::functions::{InitConnection, InvokeWithLayer, help::GetNearestDc};
        let req = InvokeWithLayer {
            layer: tl::LAYER,
            query: InitConnection {
                api_id:           init.api_id,
                device_model:     init.device_model.clone(),
                system_version:   init.system_version.clone(),
                app_version:      init.app_version.clone(),
                system_lang_code: init.system_lang_code.clone(),
                lang_pack:        init.lang_pack.clone(),
                lang_code:        init.lang_code.clone(),
                proxy:            None,
                params:           None,
                query:            GetNearestDc {},
            },
        };
        let tl::enums::NearestDc::NearestDc(dc) = self.invoke(&req).await?;
        info!("[strata] initConnection ok (this dc {}, nearest {}, {})", dc.this_dc, dc.nearest_dc, dc.country);
        Ok(())
    }

    // ── Updates & state ────────────────────────────────────────────────────

    /// Wait for the next unsolicited message.
    pub async fn next_update(&self) -> Option<Update> {
        self.inner.updates_rx.lock().await.recv().await
    }

    /// Requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.conn().dispatcher().pending()
    }

    /// Why the current connection stopped, if it did.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.conn().dispatcher().closed()
    }

    pub fn session_id(&self) -> i64 {
        self.conn().dispatcher().session_id()
    }

    /// The salt the next request will carry.
    pub fn server_salt(&self) -> i64 {
        self.conn().dispatcher().current_salt()
    }
}

/// The server does not know the key we resumed with.
fn key_rejected(e: &InvocationError) -> bool {
    match e {
        InvocationError::Disconnected(DisconnectReason::Transport(-404)) => true,
        InvocationError::Rpc(rpc) => rpc.is_auth_key_invalid(),
        _ => false,
    }
}
