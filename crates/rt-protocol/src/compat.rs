//! Compatibility with peers that speak the older status-reason encoding
//!
//! Older relays only know four outbound payloads: register, input, heartbeat
//! and a free-text `status { reason }`. Resize, signal, history requests and
//! detach notices were squeezed into that reason string:
//!
//! - `resize:{cols}x{rows}`
//! - `signal:{n}`
//! - `history:{limit}:{offset}`
//! - `detach`
//!
//! The tagged `ClientPayload` is the native form. This module converts to
//! and from the legacy form for transports configured with
//! `WireFormat::Legacy`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::WireMessage;
use crate::error::ProtocolError;
use crate::message::{ClientMessage, ClientPayload, MessageKind, RegisterRequest, TerminalSize};
use crate::session::SessionId;

/// Which outbound encoding a transport puts on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// First-class tagged variants
    #[default]
    Tagged,
    /// Register/input/heartbeat plus `status { reason }`
    Legacy,
}

/// Legacy outbound payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyPayload {
    /// Registration
    Register(RegisterRequest),
    /// Terminal input
    Input {
        /// Raw input bytes
        data: Bytes,
        /// Input sequence number
        sequence: u64,
    },
    /// Free-text status carrying a sub-command
    Status {
        /// Colon-delimited reason
        reason: String,
    },
    /// Keepalive
    Heartbeat,
}

/// Legacy outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyClientMessage {
    /// Session this message belongs to
    pub session_id: SessionId,
    /// `{session_id}-{counter}`
    pub message_id: String,
    /// Message body
    pub payload: LegacyPayload,
}

impl WireMessage for LegacyClientMessage {
    fn kind(&self) -> u8 {
        match self.payload {
            LegacyPayload::Register(_) => MessageKind::Register.as_u8(),
            LegacyPayload::Input { .. } => MessageKind::Input.as_u8(),
            LegacyPayload::Status { .. } => MessageKind::Status.as_u8(),
            LegacyPayload::Heartbeat => MessageKind::Heartbeat.as_u8(),
        }
    }

    fn accepts(kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::Register | MessageKind::Input | MessageKind::Status | MessageKind::Heartbeat
        )
    }
}

impl ClientPayload {
    /// Legacy status reason for payloads that were encoded as text
    ///
    /// Returns `None` for register, input and heartbeat, which have their
    /// own legacy variants.
    pub fn status_reason(&self) -> Option<String> {
        match self {
            ClientPayload::Resize(size) => Some(format!("resize:{}x{}", size.cols, size.rows)),
            ClientPayload::Signal { signal } => Some(format!("signal:{}", signal)),
            ClientPayload::HistoryRequest { limit, offset } => {
                Some(format!("history:{}:{}", limit, offset))
            }
            ClientPayload::Detach => Some("detach".to_string()),
            ClientPayload::Register(_) | ClientPayload::Input { .. } | ClientPayload::Heartbeat => {
                None
            }
        }
    }

    /// Parse a legacy status reason back into a tagged payload
    pub fn from_status_reason(reason: &str) -> Result<Self, ProtocolError> {
        let malformed = || ProtocolError::MalformedReason(reason.to_string());

        if reason == "detach" {
            return Ok(ClientPayload::Detach);
        }

        let (command, args) = reason.split_once(':').ok_or_else(malformed)?;
        match command {
            "resize" => {
                let (cols, rows) = args.split_once('x').ok_or_else(malformed)?;
                let cols = cols.parse().map_err(|_| malformed())?;
                let rows = rows.parse().map_err(|_| malformed())?;
                Ok(ClientPayload::Resize(TerminalSize::new(cols, rows)))
            }
            "signal" => {
                let signal = args.parse().map_err(|_| malformed())?;
                Ok(ClientPayload::Signal { signal })
            }
            "history" => {
                let (limit, offset) = args.split_once(':').ok_or_else(malformed)?;
                let limit = limit.parse().map_err(|_| malformed())?;
                let offset = offset.parse().map_err(|_| malformed())?;
                Ok(ClientPayload::HistoryRequest { limit, offset })
            }
            _ => Err(malformed()),
        }
    }
}

impl From<ClientMessage> for LegacyClientMessage {
    fn from(message: ClientMessage) -> Self {
        let payload = match message.payload {
            ClientPayload::Register(request) => LegacyPayload::Register(request),
            ClientPayload::Input { data, sequence } => LegacyPayload::Input { data, sequence },
            ClientPayload::Heartbeat => LegacyPayload::Heartbeat,
            other => LegacyPayload::Status {
                // Every remaining variant renders to a reason
                reason: other.status_reason().unwrap_or_default(),
            },
        };

        Self {
            session_id: message.session_id,
            message_id: message.message_id,
            payload,
        }
    }
}

impl TryFrom<LegacyClientMessage> for ClientMessage {
    type Error = ProtocolError;

    fn try_from(message: LegacyClientMessage) -> Result<Self, Self::Error> {
        let payload = match message.payload {
            LegacyPayload::Register(request) => ClientPayload::Register(request),
            LegacyPayload::Input { data, sequence } => ClientPayload::Input { data, sequence },
            LegacyPayload::Heartbeat => ClientPayload::Heartbeat,
            LegacyPayload::Status { reason } => ClientPayload::from_status_reason(&reason)?,
        };

        Ok(Self {
            session_id: message.session_id,
            message_id: message.message_id,
            payload,
        })
    }
}
