//! Inbound dispatcher
//!
//! One task per stream run. Messages are handled strictly in receipt order;
//! listeners are called inline on this task.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use rt_core::error::TransportError;
use rt_core::traits::InboundStream;
use rt_core::StreamState;
use rt_protocol::{ClientPayload, ServerMessage, ServerPayload};

use super::handlers::{invoke, HistoryPage, StatusChange, StreamFailure};
use super::{lock, TerminalStream};

pub(super) async fn run(stream: TerminalStream, mut inbound: InboundStream, shutdown: CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                let size = message.wire_len();
                stream.handle(message).await;
                stream.inner.metrics.lock().record_received(size);
            }
            Some(Err(e)) => {
                stream.receive_failed(e);
                break;
            }
            None => {
                tracing::debug!("Inbound stream ended");
                match stream.state() {
                    StreamState::Connected => stream.close("stream ended by relay"),
                    StreamState::Registering => stream.registration_failed(TransportError::Closed),
                    _ => {}
                }
                break;
            }
        }
    }

    tracing::debug!("Dispatcher stopped");
}

impl TerminalStream {
    async fn handle(&self, message: ServerMessage) {
        let handlers = lock(&self.inner.handlers).clone();

        match message.payload {
            ServerPayload::Output { data, .. } => {
                if let Some(handler) = handlers.output {
                    invoke("output", || handler(data));
                }
            }

            ServerPayload::SessionStarted => {
                let changed = {
                    let _shared = lock(&self.inner.shared);
                    let old = self.state();
                    if old == StreamState::Registering {
                        self.set_state(StreamState::Connected);
                        self.inner.metrics.lock().mark_connected();
                        Some(old)
                    } else {
                        None
                    }
                };

                match (changed, handlers.status) {
                    (Some(old), Some(handler)) => {
                        let change = StatusChange {
                            old,
                            new: StreamState::Connected,
                            reason: "session_started".to_string(),
                        };
                        invoke("status", || handler(&change));
                    }
                    (None, _) => tracing::debug!("Ignoring session_started in state {}", self.state()),
                    _ => {}
                }
            }

            ServerPayload::SessionClosed { reason } => {
                tracing::info!(reason = %reason, "Session closed by relay");
                self.close(&reason);
            }

            ServerPayload::Ping => {
                let outbox = lock(&self.inner.shared)
                    .run
                    .as_ref()
                    .map(|run| run.outbox.clone());
                if let Some(outbox) = outbox {
                    match outbox.try_push(ClientPayload::Heartbeat) {
                        Ok(()) => self.inner.metrics.lock().record_heartbeat(),
                        Err(e) => tracing::debug!("Ping answer not queued: {}", e),
                    }
                }
            }

            ServerPayload::Resize(size) => {
                if let Some(handler) = handlers.status {
                    let state = self.state();
                    let change = StatusChange {
                        old: state,
                        new: state,
                        reason: format!("resize:{}x{}", size.cols, size.rows),
                    };
                    invoke("status", || handler(&change));
                }
            }

            ServerPayload::History { commands, total } => {
                if let Some(handler) = handlers.history {
                    let page = HistoryPage { commands, total };
                    invoke("history", || handler(&page));
                }
            }

            ServerPayload::Signal { signal } => {
                tracing::debug!(signal, "Signal forwarded by relay");
            }

            ServerPayload::ConfigUpdate { settings } => {
                tracing::debug!(count = settings.len(), "Config update from relay");
            }

            ServerPayload::Cancel { command_id } => {
                tracing::debug!(command_id = %command_id, "Cancel from relay");
            }

            ServerPayload::Unknown { kind } => {
                tracing::warn!(kind, "Dropping unknown message kind");
            }
        }
    }

    /// Fail a pending `connect`/`attach` with the transport's own error
    fn registration_failed(&self, error: TransportError) {
        tracing::warn!("Stream lost before the session was acknowledged: {}", error);
        let mut shared = lock(&self.inner.shared);
        if self.state() != StreamState::Registering {
            return;
        }
        if let Some(run) = shared.run.take() {
            run.stop();
        }
        shared.failure = Some(error);
        self.set_state(StreamState::Error);
    }

    /// Record a receive failure; fatal once connected
    fn receive_failed(&self, error: TransportError) {
        self.inner.metrics.lock().record_error();
        if self.state() == StreamState::Registering {
            self.registration_failed(error);
            return;
        }
        tracing::warn!("Stream receive failed: {}", error);

        let was_connected = {
            let mut shared = lock(&self.inner.shared);
            if self.state() == StreamState::Connected {
                if let Some(run) = shared.run.take() {
                    run.stop();
                }
                self.set_state(StreamState::Error);
                true
            } else {
                false
            }
        };

        if was_connected {
            let handler = lock(&self.inner.handlers).error.clone();
            if let Some(handler) = handler {
                let failure = StreamFailure {
                    code: "STREAM_ERROR".to_string(),
                    message: error.to_string(),
                    fatal: true,
                };
                invoke("error", || handler(&failure));
            }
        }
    }
}
