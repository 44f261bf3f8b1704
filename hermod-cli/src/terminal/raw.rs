//! Raw terminal mode guard

use std::io;

use crossterm::terminal;

/// Enables raw mode and restores the previous mode on drop
///
/// Dropping the guard on an error path still leaves the terminal usable.
pub struct RawMode {
    was_raw: bool,
}

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        let was_raw = terminal::is_raw_mode_enabled()?;
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if !self.was_raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}
