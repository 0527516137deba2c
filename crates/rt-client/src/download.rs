//! Downloads from the remote host to local disk
//!
//! `file` copies an existing remote file. `url` has the remote host fetch
//! a URL with `curl` first, then copies the result and removes the remote
//! temp file. Both pick direct or split transfer by size and report a
//! `DownloadResult` rather than an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;

use rt_core::config::TransferConfig;
use rt_core::error::{RtError, SessionError, TransferError};
use rt_core::{Credential, SessionInfo, Transport, TransportFactory};
use rt_protocol::SessionId;

use crate::calls;
use crate::session::SessionResolver;
use crate::transfer::{shell_quote, ProgressFn, TransferEngine, TransferStats};

const MIB: f64 = 1024.0 * 1024.0;

/// Timings and counters of one download
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadMetrics {
    pub total_time: Duration,
    /// Time the remote `curl` took (URL downloads only)
    pub curl_time: Duration,
    pub transfer_time: Duration,
    pub remote_size: u64,
    pub transferred_size: u64,
    pub local_size: u64,
    pub chunks_count: u32,
    pub parts_count: u32,
    pub retries_count: u32,
}

fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / MIB / secs
}

impl DownloadMetrics {
    pub fn transfer_speed_mbps(&self) -> f64 {
        mib_per_sec(self.transferred_size, self.transfer_time)
    }

    pub fn total_speed_mbps(&self) -> f64 {
        mib_per_sec(self.transferred_size, self.total_time)
    }

    fn absorb(&mut self, stats: &TransferStats) {
        self.transferred_size = stats.bytes_transferred;
        self.chunks_count = stats.chunks_count;
        self.retries_count = stats.retries_count;
        self.parts_count = stats.parts_count;
    }

    /// Multi-line human-readable report
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Size: {:.1} MB ({} bytes)",
                self.transferred_size as f64 / MIB,
                self.transferred_size
            ),
            format!(
                "Total: {:.1}s @ {:.1} MB/s",
                self.total_time.as_secs_f64(),
                self.total_speed_mbps()
            ),
        ];
        if !self.curl_time.is_zero() {
            lines.push(format!("  curl: {:.1}s", self.curl_time.as_secs_f64()));
        }
        if !self.transfer_time.is_zero() {
            lines.push(format!(
                "  transfer: {:.1}s @ {:.1} MB/s",
                self.transfer_time.as_secs_f64(),
                self.transfer_speed_mbps()
            ));
        }
        if self.parts_count > 1 {
            lines.push(format!("Parts: {}", self.parts_count));
        }
        if self.chunks_count > 0 {
            lines.push(format!("Chunks: {}", self.chunks_count));
        }
        if self.retries_count > 0 {
            lines.push(format!("Retries: {}", self.retries_count));
        }
        lines.join("\n")
    }
}

/// Outcome of a download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub success: bool,
    pub local_path: Option<PathBuf>,
    pub size: u64,
    pub error: Option<String>,
    pub metrics: DownloadMetrics,
}

impl DownloadResult {
    fn failed(error: impl fmt::Display, metrics: DownloadMetrics) -> Self {
        Self {
            success: false,
            local_path: None,
            size: 0,
            error: Some(error.to_string()),
            metrics,
        }
    }
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.success) {
            (_, true) => f.write_str(&self.metrics.summary()),
            (Some(error), false) => write!(f, "Failed: {}", error),
            (None, false) => f.write_str("Failed"),
        }
    }
}

/// Remote file name for a URL download
fn url_file_name(url: &str) -> &str {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "download",
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Copies remote files to local disk
pub struct DownloadService {
    transport: Arc<dyn Transport>,
    factory: Arc<dyn TransportFactory>,
    credential: Option<Credential>,
    sessions: SessionResolver,
    config: TransferConfig,
}

impl DownloadService {
    pub fn new(
        transport: Arc<dyn Transport>,
        factory: Arc<dyn TransportFactory>,
        config: TransferConfig,
    ) -> Self {
        Self {
            sessions: SessionResolver::new(Arc::clone(&transport)),
            transport,
            factory,
            credential: None,
            config,
        }
    }

    /// Credential for split transfers; files above the threshold fail without one
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

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

    fn engine(&self) -> TransferEngine {
        TransferEngine::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.factory),
            self.config.clone(),
        )
        .with_credential(self.credential.clone())
        .with_hostname(self.sessions.current_hostname())
    }

    /// Copy `remote_path` to `local_path`
    pub async fn file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> DownloadResult {
        let started = Instant::now();
        let mut metrics = DownloadMetrics::default();

        let result = self
            .copy_file(remote_path, local_path, progress, &mut metrics)
            .await;
        metrics.total_time = started.elapsed();

        match result {
            Ok(size) => {
                tracing::info!(path = remote_path, size, elapsed = ?metrics.total_time, "Download complete");
                DownloadResult {
                    success: true,
                    local_path: Some(local_path.to_path_buf()),
                    size,
                    error: None,
                    metrics,
                }
            }
            Err(e) => {
                tracing::error!(path = remote_path, error = %e, "Download failed");
                DownloadResult::failed(e, metrics)
            }
        }
    }

    async fn copy_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: Option<&ProgressFn>,
        metrics: &mut DownloadMetrics,
    ) -> Result<u64, RtError> {
        let session_id = self.sessions.resolve(None).await?;
        let info = calls::file_info(&*self.transport, &session_id, remote_path).await?;
        if info.is_dir {
            return Err(TransferError::Remote(format!("{} is a directory", remote_path)).into());
        }
        metrics.remote_size = info.size;

        self.transfer(&session_id, remote_path, info.size, local_path, progress, metrics)
            .await
    }

    async fn transfer(
        &self,
        session_id: &SessionId,
        remote_path: &str,
        size: u64,
        local_path: &Path,
        progress: Option<&ProgressFn>,
        metrics: &mut DownloadMetrics,
    ) -> Result<u64, RtError> {
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let started = Instant::now();
        let stats = self
            .engine()
            .download(session_id, remote_path, size, local_path, progress)
            .await?;
        metrics.transfer_time = started.elapsed();
        metrics.absorb(&stats);
        metrics.local_size = tokio::fs::metadata(local_path)
            .await
            .map(|m| m.len())
            .unwrap_or_default();

        Ok(stats.bytes_transferred)
    }

    /// Have the remote host fetch `url`, then copy the result to `local_path`
    ///
    /// Uses the resolved session, else the active one, else a new session
    /// that is closed afterwards.
    pub async fn url(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressFn>,
    ) -> DownloadResult {
        let started = Instant::now();
        let mut metrics = DownloadMetrics::default();

        let (session_id, created) = match self.session_for_url().await {
            Ok(selected) => selected,
            Err(e) => {
                metrics.total_time = started.elapsed();
                return DownloadResult::failed(e, metrics);
            }
        };

        let remote_path = format!("/tmp/relayterm_dl_{}_{}", unix_now(), url_file_name(url));
        let result = self
            .fetch_url(&session_id, url, &remote_path, local_path, progress, &mut metrics)
            .await;

        if created {
            if let Err(e) = calls::close_session(&*self.transport, &session_id).await {
                tracing::debug!(session_id = %session_id, error = %e, "Failed to close download session");
            }
        }
        metrics.total_time = started.elapsed();

        match result {
            Ok(size) => DownloadResult {
                success: true,
                local_path: Some(local_path.to_path_buf()),
                size,
                error: None,
                metrics,
            },
            Err(e) => {
                tracing::error!(url, error = %e, "Download failed");
                DownloadResult::failed(e, metrics)
            }
        }
    }

    async fn session_for_url(&self) -> Result<(SessionId, bool), RtError> {
        match self.sessions.resolve(None).await {
            Ok(session_id) => return Ok((session_id, false)),
            Err(SessionError::NoSession) => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(active) = self.sessions.active_session(None).await? {
            tracing::debug!(session_id = %active.session_id, "Using active session");
            return Ok((active.session_id, false));
        }

        let created = calls::create_session(&*self.transport, None).await?;
        tracing::debug!(session_id = %created.session_id, "Created session for download");
        Ok((created.session_id, true))
    }

    async fn fetch_url(
        &self,
        session_id: &SessionId,
        url: &str,
        remote_path: &str,
        local_path: &Path,
        progress: Option<&ProgressFn>,
        metrics: &mut DownloadMetrics,
    ) -> Result<u64, RtError> {
        let curl_started = Instant::now();
        let command = format!(
            "curl -sS -o {} {}\n",
            shell_quote(remote_path),
            shell_quote(url)
        );
        calls::send_input(&*self.transport, session_id, Bytes::from(command)).await?;

        let size = self.wait_for_file(session_id, remote_path).await;
        metrics.curl_time = curl_started.elapsed();
        metrics.remote_size = size;
        if size == 0 {
            return Err(TransferError::Timeout(self.config.download_timeout).into());
        }
        tracing::debug!(size, curl_time = ?metrics.curl_time, "Remote file ready");

        let result = self
            .transfer(session_id, remote_path, size, local_path, progress, metrics)
            .await;

        if let Err(e) = calls::delete_file(&*self.transport, session_id, remote_path).await {
            tracing::debug!(path = remote_path, error = %e, "Failed to delete remote temp file");
        }
        result
    }

    /// Poll until the remote file's size is non-zero and unchanged between
    /// two polls; 0 when the download timeout passes first
    async fn wait_for_file(&self, session_id: &SessionId, remote_path: &str) -> u64 {
        let interval = self.config.file_poll_interval;
        let mut waited = Duration::ZERO;
        let mut last_size = 0;

        while waited < self.config.download_timeout {
            tokio::time::sleep(interval).await;
            waited += interval;

            match calls::file_info(&*self.transport, session_id, remote_path).await {
                Ok(info) if info.size > 0 && info.size == last_size => return info.size,
                Ok(info) => last_size = info.size,
                Err(e) => tracing::trace!(error = %e, "Remote file not ready"),
            }
        }
        0
    }
}
