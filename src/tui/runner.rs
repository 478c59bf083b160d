//! Reconciliation loop — one event at a time into `DashboardState`.
//!
//! Suspends only on the event channel. Every applied event that changes
//! something triggers a repaint; a quit or failure gets one final repaint
//! and ends the loop without waiting for further events.

use tracing::{debug, info, warn};

use super::app::{DashboardState, ExitStatus, Step};
use super::event::EventReceiver;
use super::screen::Screen;
use super::view;

/// How the loop ended, plus the last frame for printing after the
/// terminal is restored.
#[derive(Debug)]
pub struct LoopOutcome {
    pub status: ExitStatus,
    pub final_lines: Vec<String>,
    pub state: DashboardState,
}

/// Run the loop until quit, failure, or every producer has gone away.
pub async fn run_loop<S: Screen>(
    mut state: DashboardState,
    mut events: EventReceiver,
    screen: &mut S,
) -> anyhow::Result<LoopOutcome> {
    screen.render(&view::render(&state))?;

    loop {
        let Some(event) = events.recv().await else {
            warn!("event channel closed");
            return finish(state, ExitStatus::Failure("event channel closed".into()), screen);
        };
        debug!(?event, "applying event");

        match state.update(event) {
            Step::Skip => {}
            Step::Render => screen.render(&view::render(&state))?,
            Step::Exit(status) => {
                info!(code = status.code(), topics = state.topic_count(), "dashboard exiting");
                return finish(state, status, screen);
            }
        }
    }
}

fn finish<S: Screen>(
    state: DashboardState,
    status: ExitStatus,
    screen: &mut S,
) -> anyhow::Result<LoopOutcome> {
    let final_lines = view::render(&state);
    screen.render(&final_lines)?;
    Ok(LoopOutcome {
        status,
        final_lines,
        state,
    })
}
