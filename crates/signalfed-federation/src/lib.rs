//! Federation client: the outbound per-session tunnel a local signaling
//! session opens to a remote peer server, from dial through the
//! Welcome/Hello/Room handshake to bidirectional message proxying and
//! idempotent teardown.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod proxy;

pub use client::FederationClient;
pub use config::{
    FederationDescriptor, FederationJoinRequest, FederationTuning, TlsPolicy, DEFAULT_PING_PERIOD,
    DEFAULT_PONG_TIMEOUT, MAX_HELLO_RETRIES,
};
pub use error::{FederationError, Result};
