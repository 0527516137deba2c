//! Stream event listeners
//!
//! Listeners run on the dispatcher task, one inbound message at a time. A
//! slow listener stalls dispatch for its stream; offload heavy work to
//! another task. Listeners may call `close`/`detach` on a clone of the
//! stream. A panicking listener is logged and dispatch continues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use rt_core::StreamState;

/// State change reported to status listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub old: StreamState,
    pub new: StreamState,
    /// `session_started`, `resize:{cols}x{rows}`, ...
    pub reason: String,
}

/// Failure reported to error listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    /// Machine-readable code, e.g. `STREAM_ERROR`
    pub code: String,
    pub message: String,
    /// Whether the stream is unusable afterwards
    pub fatal: bool,
}

/// Shell history delivered over the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub commands: Vec<String>,
    pub total: u32,
}

pub type OutputHandler = Arc<dyn Fn(Bytes) + Send + Sync>;
pub type StatusHandler = Arc<dyn Fn(&StatusChange) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&StreamFailure) + Send + Sync>;
pub type HistoryHandler = Arc<dyn Fn(&HistoryPage) + Send + Sync>;
pub type DisconnectHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Handlers {
    pub output: Option<OutputHandler>,
    pub status: Option<StatusHandler>,
    pub error: Option<ErrorHandler>,
    pub history: Option<HistoryHandler>,
    pub disconnect: Option<DisconnectHandler>,
}

/// Run a listener, containing any panic
pub(crate) fn invoke(name: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(handler = name, "Stream listener panicked; continuing");
    }
}
