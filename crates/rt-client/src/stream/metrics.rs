//! Stream counters

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counters for one stream instance
///
/// Monotonic for the lifetime of the `TerminalStream`; re-attaching the
/// same instance keeps counting.
#[derive(Debug, Clone, Default)]
pub struct StreamMetrics {
    /// Input bytes sent
    pub bytes_sent: u64,
    /// Bytes received (encoded message size)
    pub bytes_received: u64,
    /// Input messages sent
    pub messages_sent: u64,
    /// Messages received
    pub messages_received: u64,
    /// Heartbeats sent (idle keepalives and ping answers)
    pub heartbeats_sent: u64,
    /// Reconnect attempts
    pub reconnect_attempts: u64,
    /// Receive errors observed
    pub errors: u64,
    /// When the stream last reached `Connected`
    pub connected_at: Option<Instant>,
    /// Last send or receive
    pub last_activity: Option<Instant>,
}

impl StreamMetrics {
    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
        self.touch();
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
        self.touch();
    }

    pub fn record_heartbeat(&mut self) {
        self.heartbeats_sent += 1;
        self.touch();
    }

    pub fn record_reconnect(&mut self) {
        self.reconnect_attempts += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn mark_connected(&mut self) {
        self.connected_at = Some(Instant::now());
        self.touch();
    }

    /// Time since the stream last connected
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|at| at.elapsed())
    }

    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }
}

/// Metrics shared between the stream, its pump and its dispatcher
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedMetrics(Arc<Mutex<StreamMetrics>>);

impl SharedMetrics {
    pub(crate) fn lock(&self) -> MutexGuard<'_, StreamMetrics> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> StreamMetrics {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sent() {
        let mut metrics = StreamMetrics::default();
        metrics.record_sent(100);
        metrics.record_sent(50);

        assert_eq!(metrics.bytes_sent, 150);
        assert_eq!(metrics.messages_sent, 2);
        assert!(metrics.last_activity.is_some());
    }

    #[test]
    fn test_record_received_and_errors() {
        let mut metrics = StreamMetrics::default();
        metrics.record_received(200);
        metrics.record_error();
        metrics.record_heartbeat();

        assert_eq!(metrics.bytes_received, 200);
        assert_eq!(metrics.messages_received, 1);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.heartbeats_sent, 1);
        assert!(metrics.uptime().is_none());
    }
}
