//! # strata: MTProto client core
//!
//! `strata` ties the workspace crates together:
//!
//! | Sub-crate          | Role                                                   |
//! |--------------------|--------------------------------------------------------|
//! | `strata-tl-parser` | Parse `.tl` schema files into an AST                   |
//! | `strata-tl-gen`    | Generate Rust source from the AST (build time)         |
//! | `strata-tl-types`  | Generated types, functions and enums; the binary codec |
//! | `strata-crypto`    | AES-IGE, SHA, RSA, pq factorization, `AuthKey`         |
//! | `strata-mtproto`   | Sans-IO framing, handshake and encrypted sessions      |
//! | `strata-client`    | Async connection, RPC dispatch, acks and resends       |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # async fn f() -> Result<(), strata::InvocationError> {
//! use strata::{Client, Config, tl::functions};
//!
//! let client = Client::connect(Config::default()).await?;
//! let strata::tl::enums::NearestDc::NearestDc(dc) =
//!     client.invoke(&functions::help::GetNearestDc {}).await?;
//! println!("connected to dc {}", dc.this_dc);
//! # Ok(()) }
//! ```
//!
//! ## Sans-IO use
//!
//! ```rust
//! use strata::mtproto::PlainSession;
//! use strata::tl::functions;
//!
//! let mut plain = PlainSession::new();
//! let frame = plain.pack(&functions::ReqPqMulti { nonce: [0; 16] });
//! assert_eq!(&frame[..8], &[0; 8]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`strata_tl_types`]: generated constructors, functions and enums.
pub use strata_tl_types as tl;

/// Re-export of [`strata_mtproto`]: framing, handshake steps and sessions.
pub use strata_mtproto as mtproto;

/// Re-export of [`strata_crypto`]: AES-IGE, SHA, RSA, factorization, `AuthKey`.
pub use strata_crypto as crypto;

/// Re-export of [`strata_client`] (requires `feature = "client"`).
#[cfg(feature = "client")]
pub use strata_client as client;

/// Re-export of [`strata_tl_parser`] (requires `feature = "parser"`).
#[cfg(feature = "parser")]
pub use strata_tl_parser as parser;

/// Re-export of [`strata_tl_gen`] (requires `feature = "codegen"`).
#[cfg(feature = "codegen")]
pub use strata_tl_gen as codegen;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use strata_tl_types::{Deserializable, Identifiable, LAYER, RemoteCall, Serializable};

pub use strata_crypto::AuthKey;
pub use strata_mtproto::authentication::{self, Finished, finish, step1, step2, step3};
pub use strata_mtproto::{EncryptedSession, PlainSession, SaltSet, TransportKind};

#[cfg(feature = "client")]
pub use strata_client::{CallOptions, Client, Config, InvocationError, RpcError, Update};
