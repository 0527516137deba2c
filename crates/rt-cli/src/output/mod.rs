//! Output formatting utilities for the CLI
//!
//! Tables for session listings and colored status messages.

use tabled::{settings::Style, Table, Tabled};

use rt_core::SessionInfo;

/// Format a list of sessions as an ASCII table
///
/// Returns "No sessions" when the list is empty.
pub fn format_sessions(sessions: &[SessionInfo]) -> String {
    if sessions.is_empty() {
        return "No sessions".to_string();
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "SESSION ID")]
        id: String,
        #[tabled(rename = "HOSTNAME")]
        hostname: String,
        #[tabled(rename = "OS")]
        os: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "SHELL")]
        shell: String,
        #[tabled(rename = "HEARTBEAT")]
        heartbeat: String,
    }

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|s| SessionRow {
            id: truncate(s.session_id.as_str(), 12),
            hostname: s.hostname.clone(),
            os: s.os.clone(),
            status: s.status.to_string(),
            shell: if s.has_shell && !s.shell.is_empty() {
                s.shell.clone()
            } else {
                "-".to_string()
            },
            heartbeat: format!("{} ago", format_duration(u64::from(s.heartbeat_age_seconds))),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn print_colored(
    out: &mut impl std::io::Write,
    color: crossterm::style::Color,
    symbol: &str,
    msg: &str,
) {
    use crossterm::style::{Print, ResetColor, SetForegroundColor};

    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(symbol),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green to stdout
pub fn print_success(msg: &str) {
    print_colored(&mut std::io::stdout(), crossterm::style::Color::Green, "✓ ", msg);
}

/// Print an error message in red to stderr
pub fn print_error(msg: &str) {
    print_colored(&mut std::io::stderr(), crossterm::style::Color::Red, "✗ ", msg);
}

/// Print a warning in yellow to stderr
pub fn print_warning(msg: &str) {
    print_colored(&mut std::io::stderr(), crossterm::style::Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan to stderr
///
/// Kept off stdout so command output stays pipeable.
pub fn print_info(msg: &str) {
    print_colored(&mut std::io::stderr(), crossterm::style::Color::Cyan, "ℹ ", msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::SessionStatus;
    use rt_protocol::SessionId;

    fn session(id: &str, hostname: &str) -> SessionInfo {
        SessionInfo {
            session_id: SessionId::new(id),
            hostname: hostname.to_string(),
            machine_name: hostname.to_string(),
            status: SessionStatus::Connected,
            os: "linux".to_string(),
            agent_version: "1.2.0".to_string(),
            heartbeat_age_seconds: 75,
            has_shell: true,
            shell: "/bin/zsh".to_string(),
            working_directory: "/root".to_string(),
            connected_at: None,
        }
    }

    #[test]
    fn test_format_sessions_empty() {
        assert_eq!(format_sessions(&[]), "No sessions");
    }

    #[test]
    fn test_format_sessions_table() {
        let table = format_sessions(&[
            session("0f8e2c1a-9b7d-4c3e-8a21-5d6f7e8a9b0c", "web-1"),
            session("short", "db-1"),
        ]);

        assert!(table.contains("SESSION ID"));
        assert!(table.contains("0f8e2c1a-..."));
        assert!(table.contains("short"));
        assert!(table.contains("web-1"));
        assert!(table.contains("connected"));
        assert!(table.contains("1m 15s ago"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(3700), "1h 1m");
        assert_eq!(format_duration(90_000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 12), "abc");
        assert_eq!(truncate("abcdefghijklmnop", 8), "abcde...");
    }
}
