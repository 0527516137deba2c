//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use rt_protocol::{DirEntry, RemoteFileInfo, SessionId, SessionRecord};

pub use rt_protocol::TerminalSize;

/// Lifecycle state of one terminal stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamState {
    /// Nothing started yet
    Idle,
    /// Opening the channel
    Connecting,
    /// Channel open, waiting for the session-started acknowledgment
    Registering,
    /// Ready for I/O
    Connected,
    /// Not used by the current engine
    Reconnecting,
    /// Tearing down
    Closing,
    /// Torn down
    Closed,
    /// Failed
    Error,
}

impl StreamState {
    /// Whether no further transitions are possible for this instance
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Error)
    }

    /// States in which inbound messages are dispatched
    pub fn dispatches(&self) -> bool {
        matches!(self, StreamState::Registering | StreamState::Connected)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Connecting => "connecting",
            StreamState::Registering => "registering",
            StreamState::Connected => "connected",
            StreamState::Reconnecting => "reconnecting",
            StreamState::Closing => "closing",
            StreamState::Closed => "closed",
            StreamState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Remote session status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connected,
    Disconnected,
    Idle,
    Unknown,
}

impl SessionStatus {
    /// Parse the relay's status string, mapping anything unrecognised to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "connected" | "active" => SessionStatus::Connected,
            "disconnected" => SessionStatus::Disconnected,
            "idle" => SessionStatus::Idle,
            _ => SessionStatus::Unknown,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A remote terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub hostname: String,
    pub machine_name: String,
    pub status: SessionStatus,
    pub os: String,
    pub agent_version: String,
    pub heartbeat_age_seconds: u32,
    pub has_shell: bool,
    pub shell: String,
    pub working_directory: String,
    /// Unix seconds
    pub connected_at: Option<u64>,
}

impl From<SessionRecord> for SessionInfo {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_id: record.session_id,
            hostname: record.machine_hostname,
            machine_name: record.machine_name,
            status: SessionStatus::parse(&record.status),
            os: record.os,
            agent_version: record.agent_version,
            heartbeat_age_seconds: record.heartbeat_age_seconds,
            has_shell: record.has_shell,
            shell: record.shell,
            working_directory: record.working_directory,
            connected_at: (record.connected_at != 0).then_some(record.connected_at),
        }
    }
}

/// Entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl From<DirEntry> for FileEntry {
    fn from(entry: DirEntry) -> Self {
        Self {
            name: entry.name,
            size: entry.size,
            is_dir: entry.is_dir,
        }
    }
}

/// Remote file metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified_at: u64,
}

impl From<RemoteFileInfo> for FileInfo {
    fn from(info: RemoteFileInfo) -> Self {
        Self {
            path: info.path,
            size: info.size,
            is_dir: info.is_dir,
            modified_at: info.modified_at,
        }
    }
}

/// Signals deliverable to a remote process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Sighup,
    Sigint,
    Sigkill,
    Sigterm,
    Sigcont,
    Sigstop,
}

impl SignalType {
    /// Unix signal number
    pub fn number(&self) -> i32 {
        match self {
            SignalType::Sighup => 1,
            SignalType::Sigint => 2,
            SignalType::Sigkill => 9,
            SignalType::Sigterm => 15,
            SignalType::Sigcont => 18,
            SignalType::Sigstop => 19,
        }
    }

    /// Parse a signal name (`SIGINT`, `int`, `2`), defaulting to `SIGTERM`
    pub fn parse(s: &str) -> Self {
        let name = s.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);
        match name {
            "HUP" | "1" => SignalType::Sighup,
            "INT" | "2" => SignalType::Sigint,
            "KILL" | "9" => SignalType::Sigkill,
            "CONT" | "18" => SignalType::Sigcont,
            "STOP" | "19" => SignalType::Sigstop,
            _ => SignalType::Sigterm,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Sighup => "SIGHUP",
            SignalType::Sigint => "SIGINT",
            SignalType::Sigkill => "SIGKILL",
            SignalType::Sigterm => "SIGTERM",
            SignalType::Sigcont => "SIGCONT",
            SignalType::Sigstop => "SIGSTOP",
        };
        f.write_str(s)
    }
}

/// Facts about the local machine sent in the register request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub hostname: String,
    pub platform: String,
    pub username: String,
    pub home_dir: String,
}

impl HostFacts {
    /// Collect facts for the current process
    pub fn collect() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            platform: std::env::consts::OS.to_string(),
            username: whoami::username(),
            home_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/"))
                .display()
                .to_string(),
        }
    }
}
