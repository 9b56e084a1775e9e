//! Bridge error types.

use thiserror::Error;

/// Errors surfaced by the bridge core to the HTTP layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input: bad hex id, oversized payload, missing field.
    #[error("Invalid request format: {0}")]
    InvalidFormat(String),

    /// The device reported a non-OK status; carries the decoded error text.
    #[error("{0}")]
    Device(String),

    /// CAN-FD setup requires a bit-rate string this bridge does not construct.
    #[error("CAN-FD initialization is not implemented")]
    NotImplemented,

    /// The operation requires an initialized channel.
    #[error("CAN channel is not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;
