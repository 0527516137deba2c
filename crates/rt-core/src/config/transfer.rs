//! File transfer settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Chunked and split transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes per read call
    pub chunk_size: u32,

    /// Files above this size are split on the remote host
    pub large_file_threshold: u64,

    /// Size of each split part
    pub part_size: u64,

    /// Parts downloaded concurrently
    pub max_parallel_parts: usize,

    /// Attempts per chunk offset in direct mode
    pub chunk_retries: u32,

    /// Delay after an empty chunk
    #[serde(with = "duration_secs")]
    pub empty_chunk_delay: Duration,

    /// Delay after a failed chunk read
    #[serde(with = "duration_secs")]
    pub failed_chunk_delay: Duration,

    /// Per-read timeout
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,

    /// Wait after issuing the remote split command
    #[serde(with = "duration_secs")]
    pub split_settle_delay: Duration,

    /// Backoff between part attempts
    pub part_backoff: BackoffConfig,

    /// Attempts per part
    pub part_attempts: u32,

    /// Overall limit for URL downloads
    #[serde(with = "duration_secs")]
    pub download_timeout: Duration,

    /// Poll interval while waiting for a remote file to settle
    #[serde(with = "duration_secs")]
    pub file_poll_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            large_file_threshold: 10 * 1024 * 1024,
            part_size: 5 * 1024 * 1024,
            max_parallel_parts: 4,
            chunk_retries: 3,
            empty_chunk_delay: Duration::from_secs(1),
            failed_chunk_delay: Duration::from_secs(2),
            read_timeout: Duration::from_secs(120),
            split_settle_delay: Duration::from_secs(3),
            part_backoff: BackoffConfig::default(),
            part_attempts: 3,
            download_timeout: Duration::from_secs(600),
            file_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}
