//! Full-screen layout: the rendered lines, top-left, no chrome.
//!
//! ```text
//! sensors/humidity: 41
//! sensors/temp: 21.5
//! test0: Hello, world! - 42
//! ```

use ratatui::text::{Line, Text};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

/// Draw the dashboard lines. Lines past the bottom edge are clipped.
pub fn draw(f: &mut Frame, lines: &[String]) {
    let text = Text::from(
        lines
            .iter()
            .map(|l| Line::raw(l.as_str()))
            .collect::<Vec<_>>(),
    );
    f.render_widget(Paragraph::new(text), f.area());
}
