//! View — `DashboardState` to display lines. Pure.

use super::app::{ConnectionStatus, DashboardState};

pub const CONNECTING_LINE: &str = "Connecting...";
pub const RECONNECTING_LINE: &str = "Reconnecting...";

/// Render the dashboard as plain lines, one per topic.
pub fn render(state: &DashboardState) -> Vec<String> {
    let mut lines = Vec::with_capacity(state.topic_count() + 2);

    if *state.status() == ConnectionStatus::Connecting && !state.ever_connected() {
        lines.push(CONNECTING_LINE.to_string());
    } else {
        lines.extend(state.entries().map(|(topic, payload)| format!("{topic}: {payload}")));
        match state.status() {
            ConnectionStatus::Failed(reason) => lines.push(format!("connection failed: {reason}")),
            ConnectionStatus::Connecting => lines.push(RECONNECTING_LINE.to_string()),
            ConnectionStatus::Connected => {}
        }
    }

    if state.quitting() {
        lines.push(String::new());
    }
    lines
}
