//! Command execution without a live stream
//!
//! The command is wrapped between two sentinels printed by the remote
//! shell:
//!
//! ```text
//! printf "\n<<CMD:{id}:START>>\n"; {command}; printf "\n<<CMD:{id}:END:%d>>\n" $?
//! ```
//!
//! The wrapped text is sent as terminal input, then the session's output
//! buffer tail is polled until both sentinels for `id` appear. Output
//! larger than the read window between two polls can lose lines; use a
//! stream for large output.

pub mod parser;

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use rt_core::config::ExecConfig;
use rt_core::Transport;
use rt_protocol::SessionId;

use crate::calls;
use self::parser::{clean_output, contains, find, rfind, strip_ansi, trim};

/// Result of one executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Cleaned output, or a diagnostic report when `exit_code` is -1
    pub output: Bytes,
    /// Remote exit status; -1 for local timeout or failure
    pub exit_code: i32,
}

impl ExecOutcome {
    /// Exit code reported for local timeouts and failures
    pub const LOCAL_FAILURE: i32 = -1;

    fn failure(message: String) -> Self {
        Self {
            output: Bytes::from(message),
            exit_code: Self::LOCAL_FAILURE,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// What a scan of the output buffer found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// Neither sentinel seen
    NotStarted,
    /// Start seen, end not yet
    Running,
    /// Both seen
    Complete(ExecOutcome),
}

/// A command wrapped in unique sentinels
#[derive(Debug, Clone)]
pub struct MarkerCommand {
    id: String,
    start: Vec<u8>,
    end_prefix: Vec<u8>,
    wrapped: String,
}

impl MarkerCommand {
    /// Wrap `command` with a fresh 12-hex-digit id
    pub fn new(command: &str) -> Self {
        let id = format!("{:012x}", rand::random::<u64>() & 0xFFFF_FFFF_FFFF);
        Self::with_id(id, command)
    }

    /// Wrap `command` with a given id
    pub fn with_id(id: impl Into<String>, command: &str) -> Self {
        let id = id.into();
        let start = format!("<<CMD:{}:START>>", id);
        let end_prefix = format!("<<CMD:{}:END:", id);
        let wrapped = format!(
            "printf \"\\n{}\\n\"; {}; printf \"\\n{}%d>>\\n\" $?\n",
            start, command, end_prefix
        );

        Self {
            id,
            start: start.into_bytes(),
            end_prefix: end_prefix.into_bytes(),
            wrapped,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Text to send as terminal input
    pub fn wrapped(&self) -> &str {
        &self.wrapped
    }

    /// First `<<CMD:{id}:END:{digits}>>` in `buffer`: (position, exit code)
    fn find_end(&self, buffer: &[u8]) -> Option<(usize, i32)> {
        let mut from = 0;
        while let Some(rel) = find(&buffer[from..], &self.end_prefix) {
            let pos = from + rel;
            let digits_start = pos + self.end_prefix.len();
            let digits_len = buffer[digits_start..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            let digits_end = digits_start + digits_len;

            if digits_len > 0 && buffer[digits_end..].starts_with(b">>") {
                let code = std::str::from_utf8(&buffer[digits_start..digits_end])
                    .ok()
                    .and_then(|s| s.parse().ok());
                if let Some(code) = code {
                    return Some((pos, code));
                }
            }
            from = pos + 1;
        }
        None
    }

    /// Offset just past a start sentinel and the line break after it
    fn content_start(&self, buffer: &[u8], start_idx: usize, limit: usize) -> usize {
        let mut at = start_idx + self.start.len();
        while at < limit && matches!(buffer[at], b'\r' | b'\n') {
            at += 1;
        }
        at
    }

    /// Look for this command's sentinels in an output buffer
    pub fn scan(&self, buffer: &[u8]) -> Scan {
        let has_start = contains(buffer, &self.start);

        match self.find_end(buffer) {
            Some((end_pos, exit_code)) if has_start => {
                // Last start before the end guards against reused buffers
                let output = match rfind(&buffer[..end_pos], &self.start) {
                    Some(start_idx) => {
                        let from = self.content_start(buffer, start_idx, end_pos);
                        Bytes::from(clean_output(&buffer[from..end_pos]))
                    }
                    None => Bytes::new(),
                };
                Scan::Complete(ExecOutcome { output, exit_code })
            }
            _ if has_start => Scan::Running,
            _ => Scan::NotStarted,
        }
    }

    /// Diagnostic report for a command whose end sentinel never appeared
    pub fn timeout_report(&self, buffer: &[u8], timeout: Duration, excerpt_limit: usize) -> String {
        let has_start = contains(buffer, &self.start);
        let has_end = self.find_end(buffer).is_some();

        let mut report = format!(
            "[relayterm] Command timed out after {}s.\n",
            timeout.as_secs_f64()
        );

        let hints: &[&str] = match (has_start, has_end) {
            (false, false) => &[
                "No markers found - command may not have been sent",
                "Check: Is the terminal session active?",
            ],
            (true, false) => &[
                "START marker found but END marker missing",
                "The command is still running or was interrupted",
                "Try: Increase timeout parameter",
            ],
            _ => &[],
        };
        if !hints.is_empty() {
            report.push_str("Hints:\n");
            for hint in hints {
                report.push_str(&format!("  - {}\n", hint));
            }
        }

        if let Some(start_idx) = rfind(buffer, &self.start) {
            let from = self.content_start(buffer, start_idx, buffer.len());
            let partial = strip_ansi(&buffer[from..]);
            let partial: Vec<u8> = partial.into_iter().filter(|&b| b != b'\r').collect();
            let partial = trim(&partial);
            if !partial.is_empty() && partial.len() < excerpt_limit {
                report.push_str("Partial output:\n");
                report.push_str(&String::from_utf8_lossy(partial));
                report.push('\n');
            }
        }

        report
    }
}

/// Run `command` in `session_id` through the marker protocol
///
/// Never fails: send/poll failures and timeouts come back as an outcome
/// with exit code -1 and a diagnostic message. Every call to the relay is
/// bounded by the time left before the deadline, so a relay that stops
/// answering still ends in a timeout report.
pub async fn run(
    transport: &dyn Transport,
    session_id: &SessionId,
    command: &str,
    timeout: Duration,
    config: &ExecConfig,
) -> ExecOutcome {
    let marker = MarkerCommand::new(command);
    tracing::debug!(session_id = %session_id, marker = marker.id(), "Executing via markers");

    let deadline = Instant::now() + timeout;
    let timed_out = |buffer: &[u8]| {
        tracing::warn!(marker = marker.id(), ?timeout, "Command timed out");
        ExecOutcome::failure(marker.timeout_report(buffer, timeout, config.excerpt_limit))
    };

    let input = Bytes::from(marker.wrapped().to_string());
    match tokio::time::timeout_at(deadline, calls::send_input(transport, session_id, input)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return ExecOutcome::failure(format!("Failed to send command: {}", e)),
        Err(_) => return timed_out(b""),
    }

    let mut buffer = Bytes::new();
    loop {
        tokio::time::sleep(config.poll_interval).await;

        let poll = calls::get_output(transport, session_id, config.read_window, 0);
        buffer = match tokio::time::timeout_at(deadline, poll).await {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(e)) => return ExecOutcome::failure(format!("Failed to get output: {}", e)),
            Err(_) => return timed_out(&buffer),
        };

        if let Scan::Complete(outcome) = marker.scan(&buffer) {
            tracing::debug!(marker = marker.id(), exit_code = outcome.exit_code, "Command finished");
            return outcome;
        }

        if Instant::now() >= deadline {
            return timed_out(&buffer);
        }
    }
}
