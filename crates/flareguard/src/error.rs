//! Crate-boundary error types.

use thiserror::Error;

/// Errors rejected at the connection registry boundary (validation, not I/O).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown connection {0}")]
    UnknownConnection(uuid::Uuid),

    #[error("thresholds must satisfy low <= medium <= high, each in [0,1]")]
    InvalidThresholds,
}

/// Errors from the push endpoint's per-connection message loop.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("transport send failed")]
    SendFailed,

    #[error("transport closed")]
    Closed,
}
