//! Split transfers over one connection per part

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use rt_core::config::BackoffConfig;
use rt_core::error::TransferError;
use rt_core::{Credential, TransportFactory};
use rt_protocol::{DirEntry, SessionId};

use super::backoff::ExponentialBackoff;
use super::{ProgressFn, TransferEngine, TransferStats};
use crate::calls;

const PART_PREFIX: &str = "part_";

/// One piece of a split file
#[derive(Debug, Clone)]
pub struct TransferPart {
    /// Position in the original file
    pub index: usize,
    /// Path of the part on the remote host
    pub remote_path: String,
    /// Declared size from the directory listing
    pub size: u64,
    /// Bytes accumulated so far
    pub data: Vec<u8>,
    pub chunks: u32,
    pub retries: u32,
}

impl TransferPart {
    fn new(index: usize, remote_path: String, size: u64) -> Self {
        Self {
            index,
            remote_path,
            size,
            data: Vec::new(),
            chunks: 0,
            retries: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.data.len() as u64 >= self.size
    }

    fn name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.remote_path)
    }
}

/// Everything a part task needs, owned so it can move onto the task
#[derive(Clone)]
struct PartFetcher {
    factory: Arc<dyn TransportFactory>,
    credential: Credential,
    hostname: Option<String>,
    chunk_size: u32,
    read_timeout: Duration,
    backoff: BackoffConfig,
    attempts: u32,
}

impl PartFetcher {
    /// Download one part, reconnecting and resuming on failure
    async fn fetch(&self, mut part: TransferPart) -> Result<TransferPart, TransferError> {
        let mut backoff = ExponentialBackoff::from_config(&self.backoff);
        let mut reason = String::new();

        for attempt in 1..=self.attempts {
            match self.attempt(&mut part).await {
                Ok(()) if part.is_complete() => return Ok(part),
                Ok(()) => {
                    reason = format!("short read: {} of {} bytes", part.data.len(), part.size)
                }
                Err(e) => reason = e.to_string(),
            }

            part.retries += 1;
            tracing::warn!(part = part.name(), attempt, reason = %reason, "Part attempt failed");
            if attempt < self.attempts {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }

        Err(TransferError::PartFailed {
            part: part.name().to_string(),
            attempts: self.attempts,
            reason,
        })
    }

    /// One connection's worth of reads, starting where the last one stopped
    async fn attempt(&self, part: &mut TransferPart) -> Result<(), TransferError> {
        let transport = self.factory.connect(&self.credential).await?;
        let session = calls::active_session(&*transport, self.hostname.as_deref())
            .await?
            .ok_or_else(|| TransferError::Remote("no active session on fresh connection".to_string()))?;

        while !part.is_complete() {
            let offset = part.data.len() as u64;
            let length = (part.size - offset).min(u64::from(self.chunk_size)) as u32;
            let chunk = tokio::time::timeout(
                self.read_timeout,
                calls::read_file(&*transport, &session.session_id, &part.remote_path, offset, length),
            )
            .await
            .map_err(|_| TransferError::Timeout(self.read_timeout))??;

            if chunk.is_empty() {
                break;
            }
            part.data.extend_from_slice(&chunk);
            part.chunks += 1;
        }
        Ok(())
    }
}

/// Remote scratch directory, unique per transfer
fn scratch_dir() -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("/tmp/relayterm_split_{}_{:08x}", stamp, rand::random::<u32>())
}

/// Quote for a POSIX shell
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl TransferEngine {
    /// Split `remote_path` on the remote host and fetch the parts
    /// concurrently, one fresh connection per part
    ///
    /// Fails with `MissingCredential` before touching the network when no
    /// credential is configured. Any part that exhausts its attempts fails
    /// the whole transfer.
    pub async fn split(
        &self,
        session_id: &SessionId,
        remote_path: &str,
        size: u64,
        local_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferStats, TransferError> {
        let credential = self
            .credential
            .clone()
            .ok_or(TransferError::MissingCredential)?;

        let split_dir = scratch_dir();

        let result = self
            .split_into(session_id, remote_path, size, local_path, progress, credential, &split_dir)
            .await;

        let cleanup = Bytes::from(format!("rm -rf {}\n", shell_quote(&split_dir)));
        if let Err(e) = calls::send_input(&*self.transport, session_id, cleanup).await {
            tracing::debug!(dir = %split_dir, error = %e, "Remote cleanup failed");
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn split_into(
        &self,
        session_id: &SessionId,
        remote_path: &str,
        size: u64,
        local_path: &Path,
        progress: Option<&ProgressFn>,
        credential: Credential,
        split_dir: &str,
    ) -> Result<TransferStats, TransferError> {
        let config = &self.config;
        let dir = shell_quote(split_dir);
        let command = format!(
            "mkdir -p {dir} && split -b {} {} {dir}/{PART_PREFIX}\n",
            config.part_size,
            shell_quote(remote_path),
        );
        tracing::debug!(path = remote_path, size, dir = split_dir, "Splitting on remote");
        calls::send_input(&*self.transport, session_id, Bytes::from(command)).await?;
        tokio::time::sleep(config.split_settle_delay).await;

        let entries = self.wait_for_parts(session_id, split_dir, size).await?;
        tracing::info!(parts = entries.len(), "Downloading parts");

        let fetcher = PartFetcher {
            factory: Arc::clone(&self.factory),
            credential,
            hostname: self.hostname.clone(),
            chunk_size: config.chunk_size,
            read_timeout: config.read_timeout,
            backoff: config.part_backoff.clone(),
            attempts: config.part_attempts.max(1),
        };
        let permits = Arc::new(Semaphore::new(config.max_parallel_parts.max(1)));
        let mut tasks = JoinSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let part = TransferPart::new(index, format!("{}/{}", split_dir, entry.name), entry.size);
            let fetcher = fetcher.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| TransferError::Remote("part pool closed".to_string()))?;
                fetcher.fetch(part).await
            });
        }

        let mut parts: Vec<Option<TransferPart>> = vec![None; tasks.len()];
        let mut received = 0u64;
        while let Some(joined) = tasks.join_next().await {
            let part = joined
                .map_err(|e| TransferError::Remote(format!("part task failed: {}", e)))??;
            received += part.data.len() as u64;
            if let Some(progress) = progress {
                progress(received, size);
            }
            let index = part.index;
            parts[index] = Some(part);
        }

        let merged: u64 = parts.iter().flatten().map(|p| p.data.len() as u64).sum();
        if merged != size {
            return Err(TransferError::SplitFailed(format!(
                "parts hold {} of {} bytes",
                merged, size
            )));
        }

        let mut stats = TransferStats::default();
        let mut file = tokio::fs::File::create(local_path).await?;
        for part in parts.into_iter().flatten() {
            file.write_all(&part.data).await?;
            stats.absorb(&TransferStats {
                bytes_transferred: part.data.len() as u64,
                chunks_count: part.chunks,
                retries_count: part.retries,
                parts_count: 1,
            });
        }
        file.flush().await?;

        tracing::info!(
            bytes = stats.bytes_transferred,
            parts = stats.parts_count,
            retries = stats.retries_count,
            "Split transfer complete"
        );
        Ok(stats)
    }

    /// List the part files until their sizes add up to `size`
    ///
    /// `split` runs detached on the remote host, so an early listing can
    /// miss parts or see the last one still growing. Gives up after
    /// `download_timeout`.
    async fn wait_for_parts(
        &self,
        session_id: &SessionId,
        split_dir: &str,
        size: u64,
    ) -> Result<Vec<DirEntry>, TransferError> {
        let config = &self.config;
        let deadline = Instant::now() + config.download_timeout;

        loop {
            let mut entries: Vec<_> = calls::list_dir(&*self.transport, session_id, split_dir)
                .await?
                .into_iter()
                .filter(|entry| !entry.is_dir && entry.name.starts_with(PART_PREFIX))
                .collect();
            let listed: u64 = entries.iter().map(|entry| entry.size).sum();

            if listed == size && !entries.is_empty() {
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                return Ok(entries);
            }
            if listed > size {
                return Err(TransferError::SplitFailed(format!(
                    "parts in {} hold {} bytes, expected {}",
                    split_dir, listed, size
                )));
            }
            if Instant::now() >= deadline {
                return Err(TransferError::SplitFailed(format!(
                    "{} parts in {} hold {} of {} bytes after {:?}",
                    entries.len(),
                    split_dir,
                    listed,
                    size,
                    config.download_timeout
                )));
            }

            tracing::debug!(parts = entries.len(), listed, size, "Split still in progress");
            tokio::time::sleep(config.file_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_scratch_dirs_are_distinct() {
        let a = scratch_dir();
        let b = scratch_dir();
        assert!(a.starts_with("/tmp/relayterm_split_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_part_progress() {
        let mut part = TransferPart::new(0, "/tmp/x/part_aa".to_string(), 4);
        assert_eq!(part.name(), "part_aa");
        assert!(!part.is_complete());
        part.data.extend_from_slice(b"abcd");
        assert!(part.is_complete());
    }
}
