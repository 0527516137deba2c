//! Terminal stream lifecycle
//!
//! A `TerminalStream` owns one bidirectional channel bound to one session:
//!
//! ```text
//! Idle -> Connecting -> Registering -> Connected -> Closing -> Closed
//!              \______________\______________\____> Error
//! ```
//!
//! Sends are accepted only in `Connected`; inbound dispatch runs from
//! `Registering` on. `Closed` and `Error` end the current run; `attach` may
//! start a new run on the same instance, though a fresh instance per attach
//! is the usual pattern.

mod channel;
mod dispatch;
pub mod handlers;
pub mod metrics;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use rt_core::config::StreamConfig;
use rt_core::error::{StreamError, TransportError};
use rt_core::{HostFacts, StreamState, Transport};
use rt_protocol::{ClientPayload, RegisterRequest, SessionId, TerminalSize};

use self::channel::Outbox;
use self::handlers::{
    invoke, Handlers, HistoryPage, StatusChange, StreamFailure,
};
use self::metrics::{SharedMetrics, StreamMetrics};

/// Reason passed to disconnect listeners by `detach`
pub const DETACHED_REASON: &str = "detached";

/// One run of the stream: the queue and the shutdown flag
struct Run {
    outbox: Outbox,
    shutdown: CancellationToken,
}

impl Run {
    /// Stop the dispatcher and end the outbound side
    fn stop(self) {
        self.shutdown.cancel();
    }
}

struct Shared {
    session_id: Option<SessionId>,
    run: Option<Run>,
    /// Why the stream died while waiting for registration
    failure: Option<TransportError>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: StreamConfig,
    host: HostFacts,
    shared: Mutex<Shared>,
    /// Current state; doubles as the readiness signal
    state: watch::Sender<StreamState>,
    handlers: Mutex<Handlers>,
    metrics: SharedMetrics,
}

/// Bidirectional terminal stream
///
/// Cheap to clone; clones share the same stream.
#[derive(Clone)]
pub struct TerminalStream {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TerminalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalStream")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminalStream {
    /// Create an idle stream over `transport`
    pub fn new(transport: Arc<dyn Transport>, config: StreamConfig) -> Self {
        Self::with_host(transport, config, HostFacts::collect())
    }

    /// Create an idle stream with explicit host facts for registration
    pub fn with_host(transport: Arc<dyn Transport>, config: StreamConfig, host: HostFacts) -> Self {
        let (state, _) = watch::channel(StreamState::Idle);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                host,
                shared: Mutex::new(Shared {
                    session_id: None,
                    run: None,
                    failure: None,
                }),
                state,
                handlers: Mutex::new(Handlers::default()),
                metrics: SharedMetrics::default(),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Listener registration
    // ---------------------------------------------------------------------

    /// Called with raw terminal output
    pub fn on_output(self, f: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        lock(&self.inner.handlers).output = Some(Arc::new(f));
        self
    }

    /// Called when the session starts or the far end resizes
    pub fn on_status(self, f: impl Fn(&StatusChange) + Send + Sync + 'static) -> Self {
        lock(&self.inner.handlers).status = Some(Arc::new(f));
        self
    }

    /// Called when receiving fails
    pub fn on_error(self, f: impl Fn(&StreamFailure) + Send + Sync + 'static) -> Self {
        lock(&self.inner.handlers).error = Some(Arc::new(f));
        self
    }

    /// Called with history requested through `request_history`
    pub fn on_history(self, f: impl Fn(&HistoryPage) + Send + Sync + 'static) -> Self {
        lock(&self.inner.handlers).history = Some(Arc::new(f));
        self
    }

    /// Called once per `close`/`detach` with the reason
    pub fn on_disconnect(self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        lock(&self.inner.handlers).disconnect = Some(Arc::new(f));
        self
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn state(&self) -> StreamState {
        *self.inner.state.borrow()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        lock(&self.inner.shared).session_id.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Connected
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> StreamMetrics {
        self.inner.metrics.snapshot()
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start a new session and wait for the relay to acknowledge it
    pub async fn connect(&self, timeout: Duration) -> Result<SessionId, StreamError> {
        self.ensure_streaming()?;

        let session_id = {
            let mut shared = lock(&self.inner.shared);
            let state = self.state();
            if state != StreamState::Idle {
                return Err(StreamError::InvalidState {
                    operation: "connect",
                    state,
                });
            }
            let session_id = SessionId::generate();
            shared.session_id = Some(session_id.clone());
            self.set_state(StreamState::Connecting);
            session_id
        };

        tracing::info!(session_id = %session_id, "Connecting terminal stream");
        let request = self.register_request(false);
        self.start(session_id, request, timeout, "connect").await
    }

    /// Attach to an existing session and wait for the relay to bind it
    ///
    /// An unknown session id is not rejected by the relay; it surfaces as a
    /// timeout.
    pub async fn attach(
        &self,
        session_id: SessionId,
        timeout: Duration,
    ) -> Result<SessionId, StreamError> {
        self.ensure_streaming()?;

        {
            let mut shared = lock(&self.inner.shared);
            let state = self.state();
            if matches!(
                state,
                StreamState::Connected | StreamState::Connecting | StreamState::Registering
            ) {
                return Err(StreamError::InvalidState {
                    operation: "attach",
                    state,
                });
            }
            // Reset anything left over from a previous run
            if let Some(run) = shared.run.take() {
                run.stop();
            }
            if shared.session_id.is_some() {
                self.inner.metrics.lock().record_reconnect();
            }
            shared.session_id = Some(session_id.clone());
            self.set_state(StreamState::Connecting);
        }

        tracing::info!(session_id = %session_id, "Attaching terminal stream");
        let request = self.register_request(true);
        self.start(session_id, request, timeout, "attach").await
    }

    /// Wait until the stream is connected
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), StreamError> {
        match self.state() {
            StreamState::Connected => return Ok(()),
            state @ (StreamState::Idle
            | StreamState::Closing
            | StreamState::Closed
            | StreamState::Error) => {
                return Err(StreamError::InvalidState {
                    operation: "wait for readiness",
                    state,
                })
            }
            StreamState::Connecting | StreamState::Registering | StreamState::Reconnecting => {}
        }

        match self.settle(timeout).await {
            Some(StreamState::Connected) => Ok(()),
            Some(state) => Err(StreamError::InvalidState {
                operation: "wait for readiness",
                state,
            }),
            None => Err(StreamError::Timeout {
                operation: "wait for readiness",
                after: timeout,
                hint: "session has not been acknowledged yet".to_string(),
            }),
        }
    }

    /// Close the stream and the remote session
    ///
    /// Idempotent; a no-op when already closing or closed. Safe to call
    /// from a listener.
    pub fn close(&self, reason: &str) {
        {
            let mut shared = lock(&self.inner.shared);
            if matches!(self.state(), StreamState::Closing | StreamState::Closed) {
                return;
            }
            self.set_state(StreamState::Closing);
            if let Some(run) = shared.run.take() {
                run.stop();
            }
            self.set_state(StreamState::Closed);
        }

        tracing::info!(reason, "Terminal stream closed");
        self.notify_disconnect(reason);
    }

    /// Leave the remote session running and tear down locally
    ///
    /// Returns the session id for a later `attach`, or `None` when the
    /// stream was not started.
    pub fn detach(&self) -> Option<SessionId> {
        let session_id = {
            let mut shared = lock(&self.inner.shared);
            let state = self.state();
            if !matches!(
                state,
                StreamState::Connected | StreamState::Connecting | StreamState::Registering
            ) {
                return None;
            }

            self.set_state(StreamState::Closing);
            if let Some(run) = shared.run.take() {
                // Best effort; the pump flushes it before ending
                if let Err(e) = run.outbox.try_push(ClientPayload::Detach) {
                    tracing::debug!("Detach notice not queued: {}", e);
                }
                run.stop();
            }
            self.set_state(StreamState::Closed);
            shared.session_id.clone()
        };

        tracing::info!(session_id = ?session_id, "Terminal stream detached");
        self.notify_disconnect(DETACHED_REASON);
        session_id
    }

    // ---------------------------------------------------------------------
    // Sends
    // ---------------------------------------------------------------------

    /// Send terminal input
    pub async fn send_input(&self, data: impl Into<Bytes>) -> Result<(), StreamError> {
        let outbox = self.connected_outbox()?;
        let data = data.into();
        let len = data.len();
        outbox.push(outbox.input(data)).await?;
        self.inner.metrics.lock().record_sent(len);
        Ok(())
    }

    /// Resize the remote terminal
    pub async fn send_resize(&self, cols: u16, rows: u16) -> Result<(), StreamError> {
        let outbox = self.connected_outbox()?;
        outbox
            .push(ClientPayload::Resize(TerminalSize::new(cols, rows)))
            .await
    }

    /// Deliver a signal to the remote foreground process
    pub async fn send_signal(&self, signal: i32) -> Result<(), StreamError> {
        let outbox = self.connected_outbox()?;
        outbox.push(ClientPayload::Signal { signal }).await
    }

    /// Ask for shell history; the answer arrives at the history listener
    pub async fn request_history(&self, limit: u32, offset: u32) -> Result<(), StreamError> {
        let outbox = self.connected_outbox()?;
        outbox
            .push(ClientPayload::HistoryRequest { limit, offset })
            .await
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn ensure_streaming(&self) -> Result<(), StreamError> {
        if self.inner.transport.is_streaming() {
            Ok(())
        } else {
            Err(StreamError::StreamingUnsupported(
                self.inner.transport.mode(),
            ))
        }
    }

    fn set_state(&self, state: StreamState) {
        let old = self.inner.state.send_replace(state);
        if old != state {
            tracing::debug!(from = %old, to = %state, "Stream state change");
        }
    }

    fn register_request(&self, attach: bool) -> RegisterRequest {
        let config = &self.inner.config;
        let host = &self.inner.host;
        let version = if attach {
            format!("{}-attach", config.client_version)
        } else {
            config.client_version.clone()
        };

        RegisterRequest {
            version,
            hostname: host.hostname.clone(),
            platform: host.platform.clone(),
            initial_size: config.initial_size,
            username: host.username.clone(),
            home_dir: host.home_dir.clone(),
        }
    }

    fn connected_outbox(&self) -> Result<Outbox, StreamError> {
        let shared = lock(&self.inner.shared);
        let state = self.state();
        match (&shared.run, state) {
            (Some(run), StreamState::Connected) => Ok(run.outbox.clone()),
            _ => Err(StreamError::NotConnected(state)),
        }
    }

    /// Open the channel, start dispatch, register and wait for readiness
    async fn start(
        &self,
        session_id: SessionId,
        request: RegisterRequest,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<SessionId, StreamError> {
        let config = &self.inner.config;
        let shutdown = CancellationToken::new();
        let (outbox, outbound) = channel::open(
            session_id.clone(),
            config.queue_capacity,
            config.keepalive_interval,
            config.enqueue_timeout,
            self.inner.metrics.clone(),
            shutdown.clone(),
        );

        let inbound = match self.inner.transport.open_stream(outbound).await {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "Failed to open stream: {}", e);
                self.fail_run();
                return Err(e.into());
            }
        };

        {
            let mut shared = lock(&self.inner.shared);
            let state = self.state();
            if state != StreamState::Connecting {
                // Closed while the channel was opening
                shutdown.cancel();
                return Err(StreamError::InvalidState { operation, state });
            }
            shared.failure = None;
            shared.run = Some(Run {
                outbox: outbox.clone(),
                shutdown: shutdown.clone(),
            });
            self.set_state(StreamState::Registering);
        }

        tokio::spawn(dispatch::run(self.clone(), inbound, shutdown));

        if let Err(e) = outbox.push(ClientPayload::Register(request)).await {
            self.fail_run();
            return Err(e);
        }

        match self.settle(timeout).await {
            Some(StreamState::Connected) => {
                tracing::info!(session_id = %session_id, "Terminal stream connected");
                Ok(session_id)
            }
            Some(state) => match lock(&self.inner.shared).failure.take() {
                Some(error) => Err(error.into()),
                None => Err(StreamError::InvalidState { operation, state }),
            },
            None => {
                self.fail_run();
                let hint = if operation == "attach" {
                    "the agent may have disconnected or the session id is unknown"
                } else {
                    "the relay did not acknowledge registration; check the relay address and API key"
                };
                Err(StreamError::Timeout {
                    operation,
                    after: timeout,
                    hint: hint.to_string(),
                })
            }
        }
    }

    /// Wait until the stream leaves the connecting states
    ///
    /// Returns `None` on timeout.
    async fn settle(&self, timeout: Duration) -> Option<StreamState> {
        let mut rx = self.inner.state.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| {
                !matches!(
                    state,
                    StreamState::Connecting | StreamState::Registering | StreamState::Reconnecting
                )
            }),
        )
        .await;

        match settled {
            Ok(Ok(state)) => Some(*state),
            // Sender lives as long as `self`
            Ok(Err(_)) => Some(self.state()),
            Err(_) => None,
        }
    }

    /// Move a starting run to `Error` and stop it
    fn fail_run(&self) {
        let mut shared = lock(&self.inner.shared);
        if let Some(run) = shared.run.take() {
            run.stop();
        }
        if !matches!(self.state(), StreamState::Closing | StreamState::Closed) {
            self.set_state(StreamState::Error);
        }
    }

    fn notify_disconnect(&self, reason: &str) {
        let handler = lock(&self.inner.handlers).disconnect.clone();
        if let Some(handler) = handler {
            invoke("disconnect", || handler(reason));
        }
    }
}
