//! One-shot command execution

use std::time::Duration;

use anyhow::Result;

use rt_core::SignalType;

use super::{select_session, Context, EXIT_FAILURE, EXIT_INTERRUPTED};
use crate::output::print_error;

/// Process exit code for a remote exit status
///
/// -1 (local timeout or failure) maps to 255; others keep their low byte.
pub fn exit_code_for(remote: i32) -> u8 {
    if remote < 0 {
        EXIT_FAILURE
    } else {
        (remote & 0xff) as u8
    }
}

/// Run `command` on the selected session and mirror its exit code
pub async fn exec_command(
    ctx: &Context,
    command: &str,
    timeout: Option<Duration>,
    host: Option<&str>,
    session: Option<&str>,
) -> Result<u8> {
    let service = ctx.terminal_service();
    let session_id = match select_session(service.sessions(), host, session).await {
        Ok(session_id) => session_id,
        Err(e) => {
            tracing::debug!(error = %e, "No session for exec");
            return Ok(EXIT_FAILURE);
        }
    };

    tokio::select! {
        outcome = service.execute(command, timeout, Some(&session_id)) => {
            let outcome = outcome?;
            let text = outcome.text();
            if outcome.exit_code < 0 {
                print_error(&text);
            } else if !text.is_empty() {
                println!("{}", text);
            }
            Ok(exit_code_for(outcome.exit_code))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(session_id = %session_id, "Interrupted, forwarding SIGINT");
            if let Err(e) = service.send_signal(Some(&session_id), SignalType::Sigint).await {
                tracing::debug!(error = %e, "Failed to forward interrupt");
            }
            Ok(EXIT_INTERRUPTED)
        }
    }
}
