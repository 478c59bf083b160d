//! Event channel — the single ordering point for everything asynchronous.
//!
//! Producers:
//! - broker delivery callback (messages)
//! - connection manager (established / lost / failed)
//! - key listener (quit, resize)
//!
//! One consumer: the reconciliation loop in `runner`. Unbounded, so a
//! producer never waits on the UI. Events arrive in send order.

use tokio::sync::mpsc;

use crate::broker::Message;

/// Events folded into `DashboardState`, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DashEvent {
    /// The broker accepted the session.
    ConnectionEstablished,
    /// The established link dropped; the client is reconnecting.
    ConnectionLost(String),
    /// Unrecoverable connection or subscription failure.
    ConnectionFailed(String),
    /// Latest payload on a topic.
    MessageReceived(Message),
    /// The user asked to leave.
    QuitRequested,
    /// Terminal size changed; repaint only.
    Resize,
}

/// Cloneable producer end.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<DashEvent>,
}

impl EventSender {
    /// Enqueue an event. Returns false once the loop has shut down.
    pub fn send(&self, event: DashEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end, owned by the reconciliation loop.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<DashEvent>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DashEvent> {
        self.rx.recv().await
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}
