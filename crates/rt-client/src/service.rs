//! Terminal operations over unary calls
//!
//! `TerminalService` is the request/response front end: input, resize,
//! signals, history and buffered output for a resolved session, plus
//! marker-based `execute` for one-shot commands. `stream()` hands out a
//! `TerminalStream` over the same transport for live I/O.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use rt_core::config::{ExecConfig, StreamConfig};
use rt_core::error::{RtError, SessionError};
use rt_core::{SessionInfo, SignalType, Transport};
use rt_protocol::SessionId;

use crate::calls;
use crate::exec::{self, ExecOutcome};
use crate::session::SessionResolver;
use crate::stream::handlers::HistoryPage;
use crate::stream::TerminalStream;

/// Unary terminal operations with a session cache
pub struct TerminalService {
    transport: Arc<dyn Transport>,
    sessions: SessionResolver,
    stream_config: StreamConfig,
    exec_config: ExecConfig,
}

impl TerminalService {
    pub fn new(
        transport: Arc<dyn Transport>,
        stream_config: StreamConfig,
        exec_config: ExecConfig,
    ) -> Self {
        Self {
            sessions: SessionResolver::new(Arc::clone(&transport)),
            transport,
            stream_config,
            exec_config,
        }
    }

    /// Session selection shared by every operation
    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    /// Target the machine matching `hostname`; see `SessionResolver::set_machine`
    pub async fn set_machine(
        &self,
        hostname: &str,
        partial_match: bool,
    ) -> Result<SessionInfo, SessionError> {
        self.sessions.set_machine(hostname, partial_match).await
    }

    pub fn set_session_id(&self, session_id: SessionId) {
        self.sessions.set_session_id(session_id);
    }

    pub fn clear_session(&self) {
        self.sessions.clear();
    }

    /// Create a remote session
    pub async fn create(&self, shell: Option<&str>) -> Result<SessionInfo, RtError> {
        let record = calls::create_session(&*self.transport, shell).await?;
        Ok(SessionInfo::from(record))
    }

    /// Close a remote session
    pub async fn close(&self, session_id: Option<&SessionId>) -> Result<(), RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        calls::close_session(&*self.transport, &session_id).await?;
        self.sessions.forget(&session_id);
        Ok(())
    }

    pub async fn send_input(
        &self,
        session_id: Option<&SessionId>,
        data: impl Into<Bytes>,
    ) -> Result<(), RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        calls::send_input(&*self.transport, &session_id, data.into()).await?;
        Ok(())
    }

    pub async fn resize(
        &self,
        session_id: Option<&SessionId>,
        cols: u16,
        rows: u16,
    ) -> Result<(), RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        calls::resize(&*self.transport, &session_id, cols, rows).await?;
        Ok(())
    }

    pub async fn send_signal(
        &self,
        session_id: Option<&SessionId>,
        signal: SignalType,
    ) -> Result<(), RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        tracing::debug!(session_id = %session_id, %signal, "Sending signal");
        calls::send_signal(&*self.transport, &session_id, signal.number()).await?;
        Ok(())
    }

    /// Shell history, newest first
    pub async fn get_history(
        &self,
        session_id: Option<&SessionId>,
        limit: u32,
        offset: u32,
    ) -> Result<HistoryPage, RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        let (commands, total) =
            calls::get_history(&*self.transport, &session_id, limit, offset).await?;
        Ok(HistoryPage { commands, total })
    }

    /// Raw terminal output buffer (`limit` 0 = relay default)
    pub async fn get_output(
        &self,
        session_id: Option<&SessionId>,
        limit: u32,
        offset: u64,
    ) -> Result<Bytes, RtError> {
        let session_id = self.sessions.resolve(session_id).await?;
        Ok(calls::get_output(&*self.transport, &session_id, limit, offset).await?)
    }

    pub async fn list_sessions(&self, hostname: Option<&str>) -> Result<Vec<SessionInfo>, RtError> {
        let records = calls::list_sessions(&*self.transport, hostname).await?;
        Ok(records.into_iter().map(SessionInfo::from).collect())
    }

    pub async fn get_active_session(
        &self,
        hostname: Option<&str>,
    ) -> Result<Option<SessionInfo>, RtError> {
        Ok(self.sessions.active_session(hostname).await?)
    }

    /// Run one command through the marker protocol
    ///
    /// Only session resolution can fail; send errors and timeouts come
    /// back as an `ExecOutcome` with exit code -1.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
        session_id: Option<&SessionId>,
    ) -> Result<ExecOutcome, SessionError> {
        let session_id = self.sessions.resolve(session_id).await?;
        let timeout = timeout.unwrap_or(self.exec_config.default_timeout);
        Ok(exec::run(&*self.transport, &session_id, command, timeout, &self.exec_config).await)
    }

    /// New idle stream over this service's transport
    ///
    /// Call `connect` for a new session or `attach` for an existing one.
    pub fn stream(&self) -> TerminalStream {
        TerminalStream::new(Arc::clone(&self.transport), self.stream_config.clone())
    }
}
