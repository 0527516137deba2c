//! Core error types for relayterm
//!
//! Errors fall into four groups: configuration errors (never retried),
//! transient channel errors (retried with bounded attempts), protocol
//! timeouts (surfaced with a hint) and remote-reported failures.

use std::path::PathBuf;
use std::time::Duration;

use rt_protocol::{ProtocolError, RpcErrorCode};
use thiserror::Error;

use crate::traits::TransportMode;
use crate::types::StreamState;

/// Top-level error type for relayterm
#[derive(Error, Debug)]
pub enum RtError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Stream lifecycle error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// File transfer error
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Session resolution error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RtError {
    /// Whether retrying the same operation may succeed
    ///
    /// Configuration errors and remote verdicts are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RtError::Stream(e) => e.is_retryable(),
            RtError::Transfer(e) => e.is_retryable(),
            RtError::Session(SessionError::Transport(e)) => e.is_transient(),
            RtError::Transport(e) => e.is_transient(),
            RtError::Io(_) => true,
            RtError::Protocol(_) | RtError::Session(_) | RtError::Config(_) => false,
        }
    }
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach the relay
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// Connection closed by the peer
    #[error("Connection closed")]
    Closed,

    /// Call did not complete in time
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// Relay or agent rejected the call
    #[error("Remote error ({code:?}): {message}")]
    Remote { code: RpcErrorCode, message: String },

    /// Response variant did not match the request
    #[error("Unexpected response to {request}: {got}")]
    UnexpectedResponse {
        request: &'static str,
        got: String,
    },

    /// Framing or serialization error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the failure is a network/channel fault worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect { .. }
            | TransportError::Closed
            | TransportError::Timeout(_)
            | TransportError::Io(_) => true,
            TransportError::Remote { code, .. } => {
                matches!(code, RpcErrorCode::Unknown | RpcErrorCode::ResourceExhausted)
            }
            TransportError::UnexpectedResponse { .. } | TransportError::Protocol(_) => false,
        }
    }
}

/// Stream lifecycle errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Send attempted outside `Connected`
    #[error("Not connected (state: {0})")]
    NotConnected(StreamState),

    /// Operation not valid in the current state
    #[error("Cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    /// Transport cannot carry a bidirectional stream
    #[error("Streaming requires a relay transport, got {0} transport")]
    StreamingUnsupported(TransportMode),

    /// Readiness was not acknowledged in time
    #[error("{operation} timed out after {after:?}; {hint}")]
    Timeout {
        operation: &'static str,
        after: Duration,
        hint: String,
    },

    /// Outbound queue stayed full past the enqueue timeout
    #[error("Outbound queue full")]
    QueueFull,

    /// Outbound pump has stopped
    #[error("Stream closed")]
    Closed,

    /// Underlying transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl StreamError {
    /// Whether a new stream instance may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Timeout { .. } | StreamError::QueueFull => true,
            StreamError::Transport(e) => e.is_transient(),
            StreamError::NotConnected(_)
            | StreamError::InvalidState { .. }
            | StreamError::StreamingUnsupported(_)
            | StreamError::Closed => false,
        }
    }
}

/// File transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Split transfer needs a credential for its per-part connections
    #[error("Split transfer requires an API key for per-part connections")]
    MissingCredential,

    /// Remote split step produced no usable parts
    #[error("Split failed: {0}")]
    SplitFailed(String),

    /// A chunk could not be read after exhausting retries
    #[error("Failed to read chunk at offset {offset} after {attempts} attempts: {reason}")]
    ChunkFailed {
        offset: u64,
        attempts: u32,
        reason: String,
    },

    /// A split part could not be downloaded after exhausting retries
    #[error("Failed to download part {part} after {attempts} attempts: {reason}")]
    PartFailed {
        part: String,
        attempts: u32,
        reason: String,
    },

    /// Remote file or command reported a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Transfer did not finish in time
    #[error("Transfer timed out after {0:?}")]
    Timeout(Duration),

    /// Local file error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error outside the retried read path
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl TransferError {
    /// Whether a fresh transfer attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::ChunkFailed { .. }
            | TransferError::PartFailed { .. }
            | TransferError::Timeout(_) => true,
            TransferError::Transport(e) => e.is_transient(),
            TransferError::MissingCredential
            | TransferError::SplitFailed(_)
            | TransferError::Remote(_)
            | TransferError::Io(_) => false,
        }
    }
}

/// Session resolution errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// No explicit, cached or auto-detected session
    #[error("No session selected; pass a session id or call set_machine first")]
    NoSession,

    /// Nothing matched the hostname
    #[error("No active session for '{hostname}'{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    NotFound {
        hostname: String,
        detail: Option<String>,
    },

    /// More than one machine matched a partial hostname
    #[error("'{hostname}' matches {matches_count} machines: {}", .hostnames.join(", "))]
    Ambiguous {
        hostname: String,
        matches_count: u32,
        hostnames: Vec<String>,
    },

    /// Transport error during lookup
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
