//! File and URL downloads

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use rt_client::DownloadService;

use super::{select_session, Context, EXIT_FAILURE};
use crate::output::{print_error, print_success};

/// Whether `source` names a URL for the remote host to fetch
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Copy a remote file, or a URL fetched by the remote host, to `local`
pub async fn download_command(
    ctx: &Context,
    source: &str,
    local: &Path,
    host: Option<&str>,
    session: Option<&str>,
) -> Result<u8> {
    let service = DownloadService::new(
        ctx.transport(),
        ctx.factory(),
        ctx.config().transfer.clone(),
    )
    .with_credential(ctx.credential());

    // A URL download may create its own session when none is selected
    let needs_session = session.is_some() || host.is_some() || !is_url(source);
    if needs_session && select_session(service.sessions(), host, session).await.is_err() {
        return Ok(EXIT_FAILURE);
    }

    let progress = |done: u64, total: u64| {
        let percent = if total == 0 { 100 } else { done * 100 / total };
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{:>3}% {}/{} bytes", percent, done, total);
        let _ = stderr.flush();
    };

    let result = if is_url(source) {
        service.url(source, local, Some(&progress)).await
    } else {
        service.file(source, local, Some(&progress)).await
    };
    eprintln!();

    if result.success {
        print_success(&format!("Downloaded {} to {}", source, local.display()));
        println!("{}", result);
        Ok(0)
    } else {
        print_error(&result.to_string());
        Ok(EXIT_FAILURE)
    }
}
