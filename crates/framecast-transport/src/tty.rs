//! Raw keystroke mode for the controlling terminal.

use std::io::IsTerminal;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Guard that keeps the terminal in raw mode (no line buffering, no echo, no
/// signal keys) until dropped.
///
/// When stdin is not a terminal (pipes, CI, headless service) the guard is
/// inert and stdin is left untouched.
pub struct RawTerminal {
    active: bool,
}

impl RawTerminal {
    /// Switch the terminal into raw mode if stdin is one.
    pub fn enable() -> Result<Self> {
        if !std::io::stdin().is_terminal() {
            debug!("stdin is not a terminal; raw mode skipped");
            return Ok(Self::inert());
        }
        enable_raw_mode().map_err(TransportError::Terminal)?;
        debug!("terminal switched to raw mode");
        Ok(Self { active: true })
    }

    /// True if the terminal was actually switched and will be restored.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn inert() -> Self {
        Self { active: false }
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(err) = disable_raw_mode() {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

impl std::fmt::Debug for RawTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTerminal")
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_guard_is_inactive() {
        let guard = RawTerminal::inert();
        assert!(!guard.is_active());
    }

    #[test]
    fn dropping_inert_guard_leaves_terminal_alone() {
        let guard = RawTerminal::inert();
        drop(guard);
        assert!(!crossterm::terminal::is_raw_mode_enabled().unwrap_or(false));
    }

    #[test]
    fn piped_stdin_is_never_switched() {
        if std::io::stdin().is_terminal() {
            return;
        }
        let guard = RawTerminal::enable().unwrap();
        assert!(!guard.is_active());
    }
}
