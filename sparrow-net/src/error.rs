//! Error types for the live TCP variant.
//!
//! Grounded in `knhk-sidecar/src/error.rs`'s `thiserror`-derived enum shape;
//! `NetError` stays local to this crate's RPC boundary and is folded into
//! `sparrow_core::transport::TransportError` (a `Timeout`/`Failed` pair a
//! scheduler already knows how to recover from) rather than propagated —
//! everything at the RPC boundary is recovered locally, never bubbled up
//! as a process-ending error.

use sparrow_core::transport::TransportError;
use thiserror::Error;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rpc timed out")]
    Timeout,

    #[error("malformed reply: {0:?}")]
    MalformedReply(String),

    #[error("malformed request: {0:?}")]
    MalformedRequest(String),

    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<NetError> for TransportError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Timeout => TransportError::Timeout,
            other => TransportError::Failed(other.to_string()),
        }
    }
}
