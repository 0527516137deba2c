//! Sequential chunked reads

use std::path::Path;

use tokio::io::AsyncWriteExt;

use rt_core::error::TransferError;
use rt_protocol::SessionId;

use super::{ProgressFn, TransferEngine, TransferStats};
use crate::calls;

impl TransferEngine {
    /// Read `remote_path` chunk by chunk into `local_path`
    ///
    /// Empty and failed reads are retried at the same offset; the transfer
    /// fails once `chunk_retries` consecutive reads at one offset failed.
    pub async fn direct(
        &self,
        session_id: &SessionId,
        remote_path: &str,
        size: u64,
        local_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferStats, TransferError> {
        let config = &self.config;
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut stats = TransferStats::default();
        let mut offset = 0u64;
        let mut failures = 0u32;

        tracing::debug!(path = remote_path, size, chunk_size = config.chunk_size, "Direct transfer");

        while offset < size {
            let length = (size - offset).min(u64::from(config.chunk_size)) as u32;
            let read = tokio::time::timeout(
                config.read_timeout,
                calls::read_file(&*self.transport, session_id, remote_path, offset, length),
            )
            .await;

            let (reason, delay) = match read {
                Ok(Ok(chunk)) if !chunk.is_empty() => {
                    file.write_all(&chunk).await?;
                    offset += chunk.len() as u64;
                    stats.bytes_transferred += chunk.len() as u64;
                    stats.chunks_count += 1;
                    failures = 0;
                    if let Some(progress) = progress {
                        progress(stats.bytes_transferred, size);
                    }
                    continue;
                }
                Ok(Ok(_)) => ("empty chunk".to_string(), config.empty_chunk_delay),
                Ok(Err(e)) => (e.to_string(), config.failed_chunk_delay),
                Err(_) => (
                    format!("read timed out after {:?}", config.read_timeout),
                    config.failed_chunk_delay,
                ),
            };

            failures += 1;
            stats.retries_count += 1;
            tracing::warn!(offset, attempt = failures, reason = %reason, "Chunk read failed");

            if failures >= config.chunk_retries {
                return Err(TransferError::ChunkFailed {
                    offset,
                    attempts: failures,
                    reason,
                });
            }
            tokio::time::sleep(delay).await;
        }

        file.flush().await?;
        tracing::debug!(
            bytes = stats.bytes_transferred,
            chunks = stats.chunks_count,
            retries = stats.retries_count,
            "Direct transfer complete"
        );
        Ok(stats)
    }
}
