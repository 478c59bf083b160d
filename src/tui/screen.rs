//! Terminal surface — paints line sequences, owns raw mode.

use std::io::{self, Stdout};

use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use super::layout;

/// Something that can show the dashboard.
pub trait Screen {
    fn render(&mut self, lines: &[String]) -> anyhow::Result<()>;
}

/// The real terminal: raw mode + alternate screen while alive.
pub struct TerminalScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl TerminalScreen {
    /// Switch the terminal into dashboard mode.
    pub fn enter() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        if let Err(err) = io::stdout().execute(EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err.into());
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.hide_cursor()?;
        Ok(Self {
            terminal,
            active: true,
        })
    }

    /// Give the terminal back. Safe to call more than once.
    pub fn restore(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        io::stdout().execute(LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Screen for TerminalScreen {
    fn render(&mut self, lines: &[String]) -> anyhow::Result<()> {
        self.terminal.draw(|f| layout::draw(f, lines))?;
        Ok(())
    }
}

impl Drop for TerminalScreen {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
