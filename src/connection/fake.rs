//! Scripted in-memory broker for connection tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::broker::{
    self, BrokerClient, BrokerError, BrokerResult, LinkCallback, LinkEvent, LinkStatus, Message,
    MessageCallback, Qos,
};

/// Connect outcomes in order; once exhausted, `fallback` repeats.
pub(crate) struct Script {
    outcomes: VecDeque<BrokerResult<()>>,
    fallback_ok: bool,
}

impl Script {
    pub(crate) fn succeed() -> Self {
        Self::from(Vec::new())
    }

    pub(crate) fn fail_then_succeed(failures: usize) -> Self {
        Self::from(
            (0..failures)
                .map(|_| Err(BrokerError::Transient("connection refused".into())))
                .collect::<Vec<BrokerResult<()>>>(),
        )
    }

    pub(crate) fn always_fail() -> Self {
        Self {
            outcomes: VecDeque::new(),
            fallback_ok: false,
        }
    }
}

impl From<Vec<BrokerResult<()>>> for Script {
    fn from(outcomes: Vec<BrokerResult<()>>) -> Self {
        Self {
            outcomes: outcomes.into(),
            fallback_ok: true,
        }
    }
}

#[derive(Default)]
struct Inner {
    connect_calls: AtomicU32,
    status: LinkStatus,
    disconnected: AtomicBool,
    subscriptions: Mutex<Vec<(String, MessageCallback)>>,
    link: Mutex<Option<LinkCallback>>,
    changed: Notify,
}

/// Test-side view of a `FakeBroker` after it moved into the manager.
#[derive(Clone)]
pub(crate) struct Probe {
    inner: Arc<Inner>,
}

impl Probe {
    pub(crate) fn connect_calls(&self) -> u32 {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.inner.status.is_up()
    }

    pub(crate) fn disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribed_filters(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(f, _)| f.clone())
            .collect()
    }

    /// Invoke the delivery callback of the first matching subscription,
    /// as the client's own task would.
    pub(crate) fn deliver(&self, message: Message) {
        let callback = self
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|(f, _)| broker::filter_matches(f, &message.topic))
            .map(|(_, cb)| Arc::clone(cb));
        if let Some(cb) = callback {
            cb(message);
        }
    }

    /// Change the link as the client's driver would: flag first, then
    /// the listener.
    pub(crate) fn link(&self, event: LinkEvent) {
        self.inner.status.set(event == LinkEvent::Up);
        let listener = self.inner.link.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    pub(crate) async fn wait_for_connect_calls(&self, n: u32) {
        self.wait_until(|| self.connect_calls() >= n).await;
    }

    pub(crate) async fn wait_for_subscriptions(&self, n: usize) {
        self.wait_until(|| self.inner.subscriptions.lock().unwrap().len() >= n)
            .await;
    }

    async fn wait_until(&self, cond: impl Fn() -> bool) {
        loop {
            let notified = self.inner.changed.notified();
            if cond() {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct FakeBroker {
    script: Script,
    rejected: Vec<String>,
    drop_on_connect: Option<String>,
    inner: Arc<Inner>,
}

impl FakeBroker {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            rejected: Vec::new(),
            drop_on_connect: None,
            inner: Arc::new(Inner::default()),
        }
    }

    /// Make the broker refuse subscriptions to `filter`.
    pub(crate) fn reject_filter(mut self, filter: &str) -> Self {
        self.rejected.push(filter.to_string());
        self
    }

    /// Lose the link right after the first CONNACK, before `connect`
    /// returns, as a driver task can.
    pub(crate) fn drop_link_on_connect(mut self, reason: &str) -> Self {
        self.drop_on_connect = Some(reason.to_string());
        self
    }

    pub(crate) fn probe(&self) -> Probe {
        Probe {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn connect(&mut self) -> BrokerResult<()> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.script.outcomes.pop_front() {
            Some(outcome) => outcome,
            None if self.script.fallback_ok => Ok(()),
            None => Err(BrokerError::Transient("connection refused".into())),
        };
        if outcome.is_ok() {
            let probe = self.probe();
            probe.link(LinkEvent::Up);
            if let Some(reason) = self.drop_on_connect.take() {
                probe.link(LinkEvent::Down(reason));
            }
        }
        self.inner.changed.notify_waiters();
        outcome
    }

    fn status(&self) -> LinkStatus {
        self.inner.status.clone()
    }

    fn set_link_listener(&mut self, listener: LinkCallback) {
        *self.inner.link.lock().unwrap() = Some(listener);
    }

    async fn subscribe(
        &mut self,
        filter: &str,
        _qos: Qos,
        on_message: MessageCallback,
    ) -> BrokerResult<()> {
        if self.rejected.iter().any(|r| r == filter) {
            return Err(BrokerError::Subscribe {
                filter: filter.to_string(),
                reason: "not authorized".into(),
            });
        }
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), on_message));
        self.inner.changed.notify_waiters();
        Ok(())
    }

    async fn publish(
        &mut self,
        topic_name: &str,
        _qos: Qos,
        _retain: bool,
        payload: String,
    ) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.probe().deliver(Message::new(topic_name, payload));
        Ok(())
    }

    async fn disconnect(&mut self, _grace: Duration) {
        self.inner.status.set(false);
        self.inner.disconnected.store(true, Ordering::SeqCst);
        self.inner.changed.notify_waiters();
    }
}
