//! Remote-to-local file transfer
//!
//! Small files are read in sequential chunks over the session's own
//! transport. Files above `large_file_threshold` are split into parts on
//! the remote host and each part is fetched over its own freshly
//! authenticated connection, so no single connection crosses the relay's
//! per-connection byte cap.

mod backoff;
mod direct;
mod split;
mod stats;

use std::path::Path;
use std::sync::Arc;

use rt_core::config::TransferConfig;
use rt_core::error::TransferError;
use rt_core::{Credential, Transport, TransportFactory};
use rt_protocol::SessionId;

pub use backoff::ExponentialBackoff;
pub(crate) use split::shell_quote;
pub use split::TransferPart;
pub use stats::TransferStats;

/// Progress listener: `(bytes_transferred, total_bytes)`
///
/// Runs on the transferring task; keep it short.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Moves remote files to local storage
pub struct TransferEngine {
    transport: Arc<dyn Transport>,
    factory: Arc<dyn TransportFactory>,
    credential: Option<Credential>,
    /// Narrows per-part session lookups to one machine
    hostname: Option<String>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        factory: Arc<dyn TransportFactory>,
        config: TransferConfig,
    ) -> Self {
        Self {
            transport,
            factory,
            credential: None,
            hostname: None,
            config,
        }
    }

    /// Credential for per-part connections; required for split transfers
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Machine the session lives on
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Whether a file of `size` bytes goes through the split path
    pub fn needs_split(&self, size: u64) -> bool {
        size > self.config.large_file_threshold
    }

    /// Transfer `remote_path` (of `size` bytes) into `local_path`
    pub async fn download(
        &self,
        session_id: &SessionId,
        remote_path: &str,
        size: u64,
        local_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferStats, TransferError> {
        if self.needs_split(size) {
            self.split(session_id, remote_path, size, local_path, progress)
                .await
        } else {
            self.direct(session_id, remote_path, size, local_path, progress)
                .await
        }
    }
}
