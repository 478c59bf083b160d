//! mqtt-tui — live terminal view of the latest payload per MQTT topic.
//!
//! The connection manager and the broker client's delivery callbacks run
//! concurrently with the UI and only ever enqueue events; the TUI runner
//! folds them into the dashboard model one at a time.

pub mod broker;
pub mod config;
pub mod connection;
pub mod tui;
