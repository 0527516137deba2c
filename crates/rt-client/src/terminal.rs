//! Local terminal mode handling for interactive sessions

use std::io::{self, stdout};

use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;

use rt_protocol::TerminalSize;

/// Raw mode held for as long as the guard lives
///
/// Owned by the caller; dropping it restores cooked mode (and leaves the
/// alternate screen if it was entered), including on early return or
/// panic unwind.
#[derive(Debug)]
pub struct RawModeGuard {
    alternate_screen: bool,
}

impl RawModeGuard {
    /// Put the local terminal into raw mode
    pub fn acquire() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self {
            alternate_screen: false,
        })
    }

    /// Also switch to the alternate screen buffer
    pub fn alternate_screen(mut self) -> io::Result<Self> {
        stdout().execute(EnterAlternateScreen)?;
        self.alternate_screen = true;
        Ok(self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.alternate_screen {
            if let Err(e) = stdout().execute(LeaveAlternateScreen) {
                tracing::warn!(error = %e, "Failed to leave alternate screen");
            }
        }
        if let Err(e) = disable_raw_mode() {
            tracing::warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

/// Current size of the local terminal, or `fallback` when unknown
pub fn local_size(fallback: TerminalSize) -> TerminalSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(cols, rows),
        _ => fallback,
    }
}
