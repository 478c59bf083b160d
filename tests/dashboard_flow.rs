//! End-to-end: connection manager + event channel + reconciliation loop,
//! against a scripted broker and a screen that reports every frame.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use mqtt_tui::broker::{
    BrokerClient, BrokerError, BrokerResult, LinkCallback, LinkEvent, LinkStatus, Message,
    MessageCallback, Qos, Subscription,
};
use mqtt_tui::connection::ConnectionManager;
use mqtt_tui::tui::app::{DashboardState, ExitStatus};
use mqtt_tui::tui::event::{self, DashEvent};
use mqtt_tui::tui::runner::{run_loop, LoopOutcome};
use mqtt_tui::tui::screen::Screen;

const RETRY: Duration = Duration::from_secs(1);
const GRACE: Duration = Duration::from_millis(250);

/// Refuses `failures` connects, then accepts. Each subscription gets the
/// configured retained messages delivered right away.
struct ScriptedBroker {
    failures: usize,
    retained: Mutex<VecDeque<Message>>,
    deny: Option<String>,
    status: LinkStatus,
    link: Option<LinkCallback>,
}

impl ScriptedBroker {
    fn new(failures: usize, retained: Vec<Message>) -> Self {
        Self {
            failures,
            retained: Mutex::new(retained.into()),
            deny: None,
            status: LinkStatus::default(),
            link: None,
        }
    }
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn connect(&mut self) -> BrokerResult<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(BrokerError::Transient("connection refused".into()));
        }
        self.status.set(true);
        if let Some(link) = &self.link {
            link(LinkEvent::Up);
        }
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    fn set_link_listener(&mut self, listener: LinkCallback) {
        self.link = Some(listener);
    }

    async fn subscribe(
        &mut self,
        filter: &str,
        _qos: Qos,
        on_message: MessageCallback,
    ) -> BrokerResult<()> {
        if self.deny.as_deref() == Some(filter) {
            return Err(BrokerError::Subscribe {
                filter: filter.into(),
                reason: "not authorized".into(),
            });
        }
        let retained: Vec<Message> = self.retained.lock().unwrap().drain(..).collect();
        // Deliver from another task, like a real client's event loop.
        tokio::spawn(async move {
            for m in retained {
                on_message(m);
            }
        });
        Ok(())
    }

    async fn publish(&mut self, _: &str, _: Qos, _: bool, _: String) -> BrokerResult<()> {
        Ok(())
    }

    async fn disconnect(&mut self, _grace: Duration) {
        self.status.set(false);
    }
}

struct ChannelScreen(mpsc::UnboundedSender<Vec<String>>);

impl Screen for ChannelScreen {
    fn render(&mut self, lines: &[String]) -> anyhow::Result<()> {
        let _ = self.0.send(lines.to_vec());
        Ok(())
    }
}

fn subs(filters: &[&str]) -> Vec<Subscription> {
    filters
        .iter()
        .map(|f| Subscription {
            filter: f.to_string(),
            qos: Qos::AtMostOnce,
        })
        .collect()
}

struct Harness {
    frames: mpsc::UnboundedReceiver<Vec<String>>,
    quit: event::EventSender,
    dashboard: tokio::task::JoinHandle<anyhow::Result<LoopOutcome>>,
    connection: mqtt_tui::connection::ConnectionHandle,
}

fn start(broker: ScriptedBroker, filters: &[&str]) -> Harness {
    let (events, receiver) = event::channel();
    let connection =
        ConnectionManager::new(broker, subs(filters), events.clone(), RETRY, GRACE).spawn();

    let (frames_tx, frames) = mpsc::unbounded_channel();
    let dashboard = tokio::spawn(async move {
        let mut screen = ChannelScreen(frames_tx);
        run_loop(DashboardState::new(), receiver, &mut screen).await
    });

    Harness {
        frames,
        quit: events,
        dashboard,
        connection,
    }
}

impl Harness {
    async fn wait_for_frame(&mut self, expected: &[&str]) {
        while let Some(frame) = self.frames.recv().await {
            if frame == expected {
                return;
            }
        }
        panic!("dashboard ended before showing {expected:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn retained_messages_show_sorted_after_retries() {
    let broker = ScriptedBroker::new(2, vec![Message::new("b", "2"), Message::new("a", "1")]);
    let started = Instant::now();
    let mut h = start(broker, &["b", "a"]);

    h.wait_for_frame(&["Connecting..."]).await;
    h.wait_for_frame(&["a: 1", "b: 2"]).await;
    assert_eq!(started.elapsed(), RETRY * 2);
    assert!(h.connection.is_connected());

    h.quit.send(DashEvent::QuitRequested);
    let outcome = h.dashboard.await.unwrap().unwrap();
    assert_eq!(outcome.status, ExitStatus::Success);
    assert_eq!(outcome.final_lines, vec!["a: 1", "b: 2", ""]);

    h.connection.shutdown(GRACE).await;
}

#[tokio::test(start_paused = true)]
async fn subscription_failure_exits_nonzero() {
    let mut broker = ScriptedBroker::new(0, Vec::new());
    broker.deny = Some("secret/#".into());
    let h = start(broker, &["secret/#"]);

    let outcome = h.dashboard.await.unwrap().unwrap();
    assert_eq!(outcome.status.code(), 1);
    assert!(outcome
        .final_lines
        .iter()
        .any(|l| l.starts_with("connection failed:") && l.contains("secret/#")));

    h.connection.shutdown(GRACE).await;
}

#[tokio::test(start_paused = true)]
async fn quit_while_connecting_is_prompt() {
    let broker = ScriptedBroker::new(usize::MAX, Vec::new());
    let mut h = start(broker, &["#"]);

    h.wait_for_frame(&["Connecting..."]).await;
    let asked = Instant::now();
    h.quit.send(DashEvent::QuitRequested);

    let outcome = h.dashboard.await.unwrap().unwrap();
    assert_eq!(outcome.final_lines, vec!["Connecting...", ""]);
    h.connection.shutdown(GRACE).await;
    assert!(asked.elapsed() < RETRY);
}
