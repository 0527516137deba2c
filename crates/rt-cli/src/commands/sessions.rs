//! Session listing

use anyhow::Result;

use super::{Context, EXIT_FAILURE};
use crate::output::{format_sessions, print_error};

/// List sessions known to the relay, optionally for one machine
pub async fn sessions_command(ctx: &Context, host: Option<&str>, json: bool) -> Result<u8> {
    let sessions = match ctx.terminal_service().list_sessions(host).await {
        Ok(sessions) => sessions,
        Err(e) => {
            print_error(&format!("Failed to list sessions: {}", e));
            return Ok(EXIT_FAILURE);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        println!("{}", format_sessions(&sessions));
    }
    Ok(0)
}
