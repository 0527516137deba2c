//! Outbound message channel and heartbeat pump
//!
//! Callers enqueue through an `Outbox`; the transport drains the matching
//! pump stream. When the queue stays idle for a keepalive interval the pump
//! emits a heartbeat in place of a message, so at least one message crosses
//! the wire per interval. After shutdown the pump flushes what is already
//! queued, then ends, which is the end-of-output signal for the transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio_util::sync::CancellationToken;

use rt_core::error::StreamError;
use rt_core::traits::OutboundStream;
use rt_protocol::{ClientMessage, ClientPayload, SessionId};

use super::metrics::SharedMetrics;

/// Builds `{session_id}-{counter}` message ids
#[derive(Debug, Clone)]
struct MessageIds {
    session_id: SessionId,
    counter: Arc<AtomicU64>,
}

impl MessageIds {
    fn message(&self, payload: ClientPayload) -> ClientMessage {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        ClientMessage::new(
            self.session_id.clone(),
            format!("{}-{}", self.session_id, n),
            payload,
        )
    }
}

/// Sending half of a stream run
#[derive(Debug, Clone)]
pub(crate) struct Outbox {
    tx: mpsc::Sender<ClientMessage>,
    ids: MessageIds,
    input_sequence: Arc<AtomicU64>,
    enqueue_timeout: Duration,
}

impl Outbox {
    /// Enqueue a payload, waiting up to the enqueue timeout for room
    pub(crate) async fn push(&self, payload: ClientPayload) -> Result<(), StreamError> {
        let message = self.ids.message(payload);
        match self.tx.send_timeout(message, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(StreamError::QueueFull),
            Err(SendTimeoutError::Closed(_)) => Err(StreamError::Closed),
        }
    }

    /// Enqueue without waiting
    pub(crate) fn try_push(&self, payload: ClientPayload) -> Result<(), StreamError> {
        let message = self.ids.message(payload);
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => StreamError::QueueFull,
            TrySendError::Closed(_) => StreamError::Closed,
        })
    }

    /// Input payload with the next input sequence number
    pub(crate) fn input(&self, data: Bytes) -> ClientPayload {
        let sequence = self.input_sequence.fetch_add(1, Ordering::Relaxed);
        ClientPayload::Input { data, sequence }
    }
}

struct Pump {
    rx: mpsc::Receiver<ClientMessage>,
    ids: MessageIds,
    keepalive: Duration,
    metrics: SharedMetrics,
    shutdown: CancellationToken,
}

impl Pump {
    async fn next(&mut self) -> Option<ClientMessage> {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => self.rx.try_recv().ok(),

            received = tokio::time::timeout(self.keepalive, self.rx.recv()) => match received {
                Ok(message) => message,
                Err(_) => {
                    tracing::trace!(session_id = %self.ids.session_id, "Outbound idle, sending heartbeat");
                    self.metrics.lock().record_heartbeat();
                    Some(self.ids.message(ClientPayload::Heartbeat))
                }
            },
        }
    }
}

/// Create the queue for one stream run
///
/// Returns the sending half and the stream the transport must drain.
pub(crate) fn open(
    session_id: SessionId,
    capacity: usize,
    keepalive: Duration,
    enqueue_timeout: Duration,
    metrics: SharedMetrics,
    shutdown: CancellationToken,
) -> (Outbox, OutboundStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let ids = MessageIds {
        session_id,
        counter: Arc::new(AtomicU64::new(0)),
    };

    let outbox = Outbox {
        tx,
        ids: ids.clone(),
        input_sequence: Arc::new(AtomicU64::new(0)),
        enqueue_timeout,
    };

    let pump = Pump {
        rx,
        ids,
        keepalive,
        metrics,
        shutdown,
    };

    let outbound = futures::stream::unfold(pump, |mut pump| async move {
        let message = pump.next().await?;
        Some((message, pump))
    })
    .boxed();

    (outbox, outbound)
}
