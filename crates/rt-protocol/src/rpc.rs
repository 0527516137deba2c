//! Unary request/response calls
//!
//! When no stream is available (or a payload is too large for one), the
//! client talks to the relay with single request/response calls. Every
//! request travels inside an `RpcEnvelope` that carries the per-call
//! authentication metadata.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::WireMessage;
use crate::message::MessageKind;
use crate::session::SessionId;

/// Per-call authentication metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// API key presented to the relay
    pub api_key: Option<String>,
    /// Client version string
    pub client_version: String,
}

impl CallMetadata {
    /// Create metadata with an API key
    pub fn with_api_key(api_key: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            client_version: client_version.into(),
        }
    }
}

/// Unary requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Write bytes to a session's terminal
    SendInput { session_id: SessionId, data: Bytes },

    /// Resize a session's terminal
    Resize {
        session_id: SessionId,
        cols: u16,
        rows: u16,
    },

    /// Deliver a signal to a session
    SendSignal { session_id: SessionId, signal: i32 },

    /// Fetch shell history
    GetHistory {
        session_id: SessionId,
        limit: u32,
        offset: u32,
    },

    /// Fetch the tail of the session's output buffer
    GetOutput {
        session_id: SessionId,
        /// Max bytes (0 = relay default)
        limit: u32,
        offset: u64,
    },

    /// Read a byte range of a remote file
    ReadFile {
        session_id: SessionId,
        path: String,
        offset: u64,
        length: u32,
    },

    /// List a remote directory
    ListDir { session_id: SessionId, path: String },

    /// Stat a remote file
    FileInfo { session_id: SessionId, path: String },

    /// Delete a remote file
    DeleteFile { session_id: SessionId, path: String },

    /// Resolve the active session of a machine by hostname
    GetSessionByHostname {
        hostname: String,
        partial_match: bool,
    },

    /// List sessions, optionally filtered by hostname
    ListSessions { hostname: Option<String> },

    /// Most recently active session, optionally filtered by hostname
    GetActiveSession { hostname: Option<String> },

    /// Create a new remote session
    CreateSession { shell: Option<String> },

    /// Close a remote session
    CloseSession { session_id: SessionId },
}

impl RpcRequest {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            RpcRequest::SendInput { .. } => "send_input",
            RpcRequest::Resize { .. } => "resize",
            RpcRequest::SendSignal { .. } => "send_signal",
            RpcRequest::GetHistory { .. } => "get_history",
            RpcRequest::GetOutput { .. } => "get_output",
            RpcRequest::ReadFile { .. } => "read_file",
            RpcRequest::ListDir { .. } => "list_dir",
            RpcRequest::FileInfo { .. } => "file_info",
            RpcRequest::DeleteFile { .. } => "delete_file",
            RpcRequest::GetSessionByHostname { .. } => "get_session_by_hostname",
            RpcRequest::ListSessions { .. } => "list_sessions",
            RpcRequest::GetActiveSession { .. } => "get_active_session",
            RpcRequest::CreateSession { .. } => "create_session",
            RpcRequest::CloseSession { .. } => "close_session",
        }
    }
}

/// Request plus metadata, as framed on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    /// Authentication metadata
    pub metadata: CallMetadata,
    /// The request
    pub request: RpcRequest,
}

impl WireMessage for RpcEnvelope {
    fn kind(&self) -> u8 {
        MessageKind::RpcRequest.as_u8()
    }

    fn accepts(kind: MessageKind) -> bool {
        kind == MessageKind::RpcRequest
    }
}

/// Remote session as reported by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub machine_hostname: String,
    pub machine_name: String,
    /// "connected", "disconnected", ...
    pub status: String,
    pub os: String,
    pub agent_version: String,
    pub heartbeat_age_seconds: u32,
    pub has_shell: bool,
    pub shell: String,
    pub working_directory: String,
    /// Unix seconds, 0 if unknown
    pub connected_at: u64,
}

/// Result of a hostname lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLookup {
    /// Exactly one machine matched
    Found(SessionRecord),
    /// More than one machine matched a partial hostname
    Ambiguous {
        matches_count: u32,
        hostnames: Vec<String>,
    },
    /// Nothing matched
    NotFound { error: Option<String> },
}

/// Remote directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Remote file metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// Unix seconds
    pub modified_at: u64,
}

/// Error codes carried by `RpcResponse::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum RpcErrorCode {
    /// Unknown error
    Unknown = 0,
    /// Session not found
    SessionNotFound = 1,
    /// Authentication failed
    Unauthenticated = 2,
    /// Path not found on the remote host
    NotFound = 3,
    /// Request not supported by this transport
    Unimplemented = 4,
    /// Relay refused the request (limits)
    ResourceExhausted = 5,
}

/// Unary responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    /// Request accepted, nothing to return
    Ok,
    /// Output buffer contents
    Output { data: Bytes },
    /// File bytes for a `ReadFile`
    FileChunk { data: Bytes },
    /// Directory listing
    DirListing { entries: Vec<DirEntry> },
    /// File metadata
    FileInfo(RemoteFileInfo),
    /// Shell history
    History { commands: Vec<String>, total: u32 },
    /// Hostname lookup result
    Session(SessionLookup),
    /// Session list
    Sessions { sessions: Vec<SessionRecord> },
    /// Active session, if any
    ActiveSession(Option<SessionRecord>),
    /// Newly created session
    Created(SessionRecord),
    /// Request failed on the relay or agent
    Error { code: RpcErrorCode, message: String },
}

impl WireMessage for RpcResponse {
    fn kind(&self) -> u8 {
        MessageKind::RpcResponse.as_u8()
    }

    fn accepts(kind: MessageKind) -> bool {
        kind == MessageKind::RpcResponse
    }
}
