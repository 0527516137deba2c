//! Stream and command-execution settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use rt_protocol::TerminalSize;

use super::serde_utils::{duration_millis, duration_secs};

/// Terminal stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum outbound idle gap before a heartbeat is sent
    ///
    /// Must stay below the relay's idle timeout.
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Outbound queue capacity (messages)
    pub queue_capacity: usize,

    /// How long an enqueue may wait on a full queue
    #[serde(with = "duration_secs")]
    pub enqueue_timeout: Duration,

    /// Default wait for the session-started acknowledgment
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Version sent in the register request
    pub client_version: String,

    /// Terminal size announced at registration
    pub initial_size: TerminalSize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(25),
            queue_capacity: 1000,
            enqueue_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            client_version: concat!("relayterm-", env!("CARGO_PKG_VERSION")).to_string(),
            initial_size: TerminalSize::default(),
        }
    }
}

/// Marker-protocol execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Interval between output-buffer polls
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Bytes requested per poll
    pub read_window: u32,

    /// Timeout when the caller gives none
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,

    /// Partial output larger than this is left out of timeout reports
    pub excerpt_limit: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            read_window: 20 * 1024,
            default_timeout: Duration::from_secs(30),
            excerpt_limit: 2000,
        }
    }
}
