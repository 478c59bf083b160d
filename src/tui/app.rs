//! DashboardState — the TEA model.
//!
//! All state lives here. `update` folds one `DashEvent` into it and tells
//! the loop what to do next. View reads state; no side effects in view.
//!
//! The topic table is a `BTreeMap`, so iteration order is the sorted,
//! duplicate-free topic set at every point a reader can observe it.

use std::collections::BTreeMap;

use super::event::DashEvent;

/// Connection status as last reported through the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(String),
}

/// How the process should end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// User-initiated quit.
    Success,
    /// Connection or subscription failure.
    Failure(String),
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure(_) => 1,
        }
    }
}

/// What the loop does after applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// State changed (or the screen needs a repaint).
    Render,
    /// Nothing changed.
    Skip,
    /// Render one last time, then stop.
    Exit(ExitStatus),
}

/// The single-owner dashboard model.
#[derive(Debug, Clone)]
pub struct DashboardState {
    status: ConnectionStatus,
    /// Topic → latest payload.
    topics: BTreeMap<String, String>,
    /// Set by the first `ConnectionEstablished`; never cleared.
    ever_connected: bool,
    quitting: bool,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            topics: BTreeMap::new(),
            ever_connected: false,
            quitting: false,
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    pub fn quitting(&self) -> bool {
        self.quitting
    }

    /// Topics in sorted order.
    pub fn ordered_topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// `(topic, payload)` pairs in topic order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.topics.iter().map(|(t, p)| (t.as_str(), p.as_str()))
    }

    pub fn payload(&self, topic: &str) -> Option<&str> {
        self.topics.get(topic).map(String::as_str)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Apply one event.
    pub fn update(&mut self, event: DashEvent) -> Step {
        if self.quitting {
            return Step::Skip;
        }

        match event {
            DashEvent::ConnectionEstablished => {
                self.status = ConnectionStatus::Connected;
                self.ever_connected = true;
                Step::Render
            }
            DashEvent::ConnectionLost(_) => {
                if self.status != ConnectionStatus::Connected {
                    return Step::Skip;
                }
                self.status = ConnectionStatus::Connecting;
                Step::Render
            }
            DashEvent::ConnectionFailed(reason) => {
                self.status = ConnectionStatus::Failed(reason.clone());
                self.quitting = true;
                Step::Exit(ExitStatus::Failure(reason))
            }
            DashEvent::MessageReceived(message) => {
                // Recorded even while connecting; shown once the view
                // leaves the connecting gate.
                self.topics.insert(message.topic, message.payload);
                Step::Render
            }
            DashEvent::QuitRequested => {
                self.quitting = true;
                Step::Exit(ExitStatus::Success)
            }
            DashEvent::Resize => Step::Render,
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}
