//! Stream message types for the relayterm protocol
//!
//! This module defines the messages carried by the long-lived bidirectional
//! terminal stream. The client half (`ClientMessage`) flows from this engine
//! to the relay; the server half (`ServerMessage`) flows back.
//!
//! # Message Flow
//!
//! Typical sequence for one stream:
//!
//! 1. Client opens the stream and sends `Register` (attach uses the same
//!    request with an `-attach` version suffix)
//! 2. Relay answers with `SessionStarted` once the remote agent is bound
//! 3. `Input` flows client → relay, `Output` flows relay → client
//! 4. Client sends `Heartbeat` whenever its outbound side is idle for a
//!    keepalive interval; relay may probe with `Ping`
//! 5. Session end: client `Detach` (remote survives) or relay
//!    `SessionClosed` (remote gone)
//!
//! Every client message carries a `message_id` of the form
//! `{session_id}-{counter}`. The counter is for diagnostics only; delivery
//! order is the channel order.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::WireMessage;
use crate::session::SessionId;

/// Current protocol version string.
///
/// Sent in the `Register` request. Attach requests append `-attach`.
pub const PROTOCOL_VERSION: &str = "rt-1.0";

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns
    pub cols: u16,
    /// Number of rows
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Default terminal size (80x24)
    pub fn default_size() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Message kind identifier carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Client registration / attach
    Register = 0x01,
    /// Terminal input bytes
    Input = 0x02,
    /// Terminal resize request
    Resize = 0x03,
    /// Signal for the remote process
    Signal = 0x04,
    /// Shell history request
    HistoryRequest = 0x05,
    /// Client keepalive
    Heartbeat = 0x06,
    /// Client detaching without closing the remote session
    Detach = 0x07,
    /// Legacy free-text status update
    Status = 0x08,

    /// Terminal output bytes
    Output = 0x20,
    /// Session bound and ready
    SessionStarted = 0x21,
    /// Session closed by the far end
    SessionClosed = 0x22,
    /// Signal forwarded by the relay
    SignalEcho = 0x23,
    /// Keepalive probe from the relay
    Ping = 0x24,
    /// Terminal dimensions changed on the far end
    ResizeEcho = 0x25,
    /// Shell history response
    HistoryResponse = 0x26,
    /// Settings pushed by the relay
    ConfigUpdate = 0x27,
    /// Cancel a running command
    Cancel = 0x28,

    /// Unary request envelope
    RpcRequest = 0x40,
    /// Unary response
    RpcResponse = 0x41,
}

impl MessageKind {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Register),
            0x02 => Some(Self::Input),
            0x03 => Some(Self::Resize),
            0x04 => Some(Self::Signal),
            0x05 => Some(Self::HistoryRequest),
            0x06 => Some(Self::Heartbeat),
            0x07 => Some(Self::Detach),
            0x08 => Some(Self::Status),
            0x20 => Some(Self::Output),
            0x21 => Some(Self::SessionStarted),
            0x22 => Some(Self::SessionClosed),
            0x23 => Some(Self::SignalEcho),
            0x24 => Some(Self::Ping),
            0x25 => Some(Self::ResizeEcho),
            0x26 => Some(Self::HistoryResponse),
            0x27 => Some(Self::ConfigUpdate),
            0x28 => Some(Self::Cancel),
            0x40 => Some(Self::RpcRequest),
            0x41 => Some(Self::RpcResponse),
            _ => None,
        }
    }
}

/// Registration payload sent when a stream opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Client version; attach requests end in `-attach`
    pub version: String,
    /// Hostname of the machine running the client
    pub hostname: String,
    /// Operating system (e.g., "linux", "macos")
    pub platform: String,
    /// Initial terminal size
    pub initial_size: TerminalSize,
    /// Local username
    pub username: String,
    /// Local home directory
    pub home_dir: String,
}

impl RegisterRequest {
    /// Whether this request attaches to an existing session
    pub fn is_attach(&self) -> bool {
        self.version.ends_with("-attach")
    }
}

/// Outbound payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientPayload {
    /// Register a new session or attach to an existing one
    Register(RegisterRequest),

    /// Terminal input
    Input {
        /// Raw input bytes
        data: Bytes,
        /// Input sequence number
        sequence: u64,
    },

    /// Resize the remote terminal
    Resize(TerminalSize),

    /// Deliver a signal to the remote foreground process
    Signal {
        /// Unix signal number
        signal: i32,
    },

    /// Ask the agent for shell history
    HistoryRequest {
        /// Maximum number of commands
        limit: u32,
        /// Pagination offset
        offset: u32,
    },

    /// Keepalive
    Heartbeat,

    /// Local client is leaving; the remote session stays alive
    Detach,
}

impl ClientPayload {
    /// Get the message kind for this payload
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientPayload::Register(_) => MessageKind::Register,
            ClientPayload::Input { .. } => MessageKind::Input,
            ClientPayload::Resize(_) => MessageKind::Resize,
            ClientPayload::Signal { .. } => MessageKind::Signal,
            ClientPayload::HistoryRequest { .. } => MessageKind::HistoryRequest,
            ClientPayload::Heartbeat => MessageKind::Heartbeat,
            ClientPayload::Detach => MessageKind::Detach,
        }
    }
}

/// Message sent from the client to the relay over the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Session this message belongs to
    pub session_id: SessionId,
    /// `{session_id}-{counter}`
    pub message_id: String,
    /// Message body
    pub payload: ClientPayload,
}

impl ClientMessage {
    /// Create a new client message
    pub fn new(session_id: SessionId, message_id: String, payload: ClientPayload) -> Self {
        Self {
            session_id,
            message_id,
            payload,
        }
    }

    /// Approximate wire size used for metrics
    pub fn wire_len(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(0)
    }
}

impl WireMessage for ClientMessage {
    fn kind(&self) -> u8 {
        self.payload.kind().as_u8()
    }

    fn accepts(kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::Register
                | MessageKind::Input
                | MessageKind::Resize
                | MessageKind::Signal
                | MessageKind::HistoryRequest
                | MessageKind::Heartbeat
                | MessageKind::Detach
        )
    }
}

/// Inbound payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerPayload {
    /// Terminal output to display
    Output {
        /// Raw output bytes
        data: Bytes,
        /// Output sequence number
        sequence: u64,
    },

    /// Remote session is bound; the stream is ready
    SessionStarted,

    /// Remote session closed
    SessionClosed {
        /// Reason given by the far end
        reason: String,
    },

    /// Signal forwarded from the far end
    Signal {
        /// Unix signal number
        signal: i32,
    },

    /// Keepalive probe
    Ping,

    /// Terminal dimensions changed on the far end
    Resize(TerminalSize),

    /// Shell history
    History {
        /// Commands, most recent last
        commands: Vec<String>,
        /// Total available
        total: u32,
    },

    /// Settings pushed by the relay
    ConfigUpdate {
        /// Key/value pairs
        settings: Vec<(String, String)>,
    },

    /// Cancel a running command
    Cancel {
        /// Command to cancel
        command_id: String,
    },

    /// A message kind this client does not understand
    Unknown {
        /// Raw kind byte from the frame header
        kind: u8,
    },
}

impl ServerPayload {
    /// Raw kind byte for this payload
    pub fn kind(&self) -> u8 {
        match self {
            ServerPayload::Output { .. } => MessageKind::Output.as_u8(),
            ServerPayload::SessionStarted => MessageKind::SessionStarted.as_u8(),
            ServerPayload::SessionClosed { .. } => MessageKind::SessionClosed.as_u8(),
            ServerPayload::Signal { .. } => MessageKind::SignalEcho.as_u8(),
            ServerPayload::Ping => MessageKind::Ping.as_u8(),
            ServerPayload::Resize(_) => MessageKind::ResizeEcho.as_u8(),
            ServerPayload::History { .. } => MessageKind::HistoryResponse.as_u8(),
            ServerPayload::ConfigUpdate { .. } => MessageKind::ConfigUpdate.as_u8(),
            ServerPayload::Cancel { .. } => MessageKind::Cancel.as_u8(),
            ServerPayload::Unknown { kind } => *kind,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ServerPayload::Output { .. } => "output",
            ServerPayload::SessionStarted => "session_started",
            ServerPayload::SessionClosed { .. } => "session_closed",
            ServerPayload::Signal { .. } => "signal",
            ServerPayload::Ping => "ping",
            ServerPayload::Resize(_) => "resize",
            ServerPayload::History { .. } => "history",
            ServerPayload::ConfigUpdate { .. } => "config_update",
            ServerPayload::Cancel { .. } => "cancel",
            ServerPayload::Unknown { .. } => "unknown",
        }
    }
}

/// Message sent from the relay to the client over the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Session this message belongs to
    pub session_id: SessionId,
    /// Message body
    pub payload: ServerPayload,
}

impl ServerMessage {
    /// Create a new server message
    pub fn new(session_id: SessionId, payload: ServerPayload) -> Self {
        Self {
            session_id,
            payload,
        }
    }

    /// Approximate wire size used for metrics
    pub fn wire_len(&self) -> usize {
        bincode::serialized_size(self).map(|n| n as usize).unwrap_or(0)
    }
}

impl WireMessage for ServerMessage {
    fn kind(&self) -> u8 {
        self.payload.kind()
    }

    fn accepts(kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::Output
                | MessageKind::SessionStarted
                | MessageKind::SessionClosed
                | MessageKind::SignalEcho
                | MessageKind::Ping
                | MessageKind::ResizeEcho
                | MessageKind::HistoryResponse
                | MessageKind::ConfigUpdate
                | MessageKind::Cancel
        )
    }

    fn unknown(kind: u8) -> Option<Self> {
        Some(Self {
            session_id: SessionId::new(""),
            payload: ServerPayload::Unknown { kind },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_roundtrip() {
        for kind in [
            MessageKind::Register,
            MessageKind::Input,
            MessageKind::Heartbeat,
            MessageKind::Status,
            MessageKind::Output,
            MessageKind::SessionStarted,
            MessageKind::Cancel,
            MessageKind::RpcResponse,
        ] {
            let byte = kind.as_u8();
            assert_eq!(MessageKind::from_u8(byte), Some(kind));
        }
        assert_eq!(MessageKind::from_u8(0x99), None);
    }

    #[test]
    fn test_terminal_size_default() {
        let size = TerminalSize::default();
        assert_eq!(size.cols, 80);
        assert_eq!(size.rows, 24);
    }

    #[test]
    fn test_client_and_server_families_are_disjoint() {
        for byte in 0u8..=0xFF {
            if let Some(kind) = MessageKind::from_u8(byte) {
                assert!(!(ClientMessage::accepts(kind) && ServerMessage::accepts(kind)));
            }
        }
    }

    #[test]
    fn test_attach_version_suffix() {
        let mut request = RegisterRequest {
            version: PROTOCOL_VERSION.to_string(),
            hostname: "dev".to_string(),
            platform: "linux".to_string(),
            initial_size: TerminalSize::default(),
            username: "me".to_string(),
            home_dir: "/home/me".to_string(),
        };
        assert!(!request.is_attach());

        request.version = format!("{}-attach", PROTOCOL_VERSION);
        assert!(request.is_attach());
    }
}
