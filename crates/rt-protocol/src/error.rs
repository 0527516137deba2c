//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown message kind for a decoder with no fallback variant
    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// Known message kind that does not belong to the decoded family
    #[error("Unexpected message type {0:#04x} for this channel")]
    UnexpectedMessageType(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Status reason that does not follow the colon-delimited convention
    #[error("Malformed status reason: {0:?}")]
    MalformedReason(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
