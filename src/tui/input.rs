//! Key listener — terminal input to dashboard events.
//!
//! Any key press quits. Resize triggers a repaint. Everything else is
//! dropped at the source.

use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::event::{DashEvent, EventSender};

/// How long one poll waits before re-checking that the loop is alive.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Map a key event. Release/repeat events (reported on some platforms)
/// are ignored so one keystroke yields one quit.
pub fn handle_key(key: KeyEvent) -> Option<DashEvent> {
    match key.kind {
        KeyEventKind::Press => Some(DashEvent::QuitRequested),
        _ => None,
    }
}

/// Map any terminal event.
pub fn translate(event: Event) -> Option<DashEvent> {
    match event {
        Event::Key(key) => handle_key(key),
        Event::Resize(_, _) => Some(DashEvent::Resize),
        _ => None,
    }
}

/// Read terminal events on a blocking task until the loop goes away.
pub fn spawn_key_listener(events: EventSender) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !events.is_closed() {
            match event::poll(POLL_INTERVAL) {
                Ok(false) => {}
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if let Some(dash) = translate(ev) {
                            if !events.send(dash) {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(%err, "reading terminal event failed");
                        events.send(DashEvent::QuitRequested);
                        break;
                    }
                },
                Err(err) => {
                    warn!(%err, "polling terminal failed");
                    events.send(DashEvent::QuitRequested);
                    break;
                }
            }
        }
        debug!("key listener stopped");
    })
}
