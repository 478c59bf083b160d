//! Broker client — the capability the dashboard needs from a pub/sub bus.
//!
//! The rest of the crate talks to `BrokerClient` only. `RumqttClient` is
//! the production implementation; tests script their own.
//!
//! Deliveries arrive through callbacks invoked on the client's own task.
//! Callbacks must not block on anything but a channel send.

pub mod error;
pub mod rumqtt;
mod suback;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use error::{BrokerError, BrokerResult};
pub use rumqtt::RumqttClient;

/// The last-known value published on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Delivery guarantee requested for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(other),
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        };
        write!(f, "{level}")
    }
}

/// A topic filter to subscribe to at startup. Immutable for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    pub qos: Qos,
}

/// Well-formed subscription filter: `#` only as the last level, `+` only
/// as a whole level.
pub fn is_valid_filter(filter: &str) -> bool {
    !filter.contains('\0') && rumqttc::valid_filter(filter)
}

/// Whether a published topic name falls under `filter`.
///
/// rumqttc refuses every `$` topic. Those are compared with the `$`
/// stripped from both sides, so `$SYS/#` still matches `$SYS/uptime` while
/// `#` and `+/...` never do.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    match topic.strip_prefix('$') {
        Some(rest) => filter
            .strip_prefix('$')
            .is_some_and(|filter| rumqttc::matches(rest, filter)),
        None => rumqttc::matches(topic, filter),
    }
}

/// The client's own view of whether its session is up. Clones share the
/// flag.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicBool>);

impl LinkStatus {
    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Store `up`, returning the previous value.
    pub fn set(&self, up: bool) -> bool {
        self.0.swap(up, Ordering::SeqCst)
    }
}

/// Link state changes: the session coming up (first CONNACK included) or
/// dropping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// CONNACK accepted, on the first connect or a reconnect.
    Up,
    /// The established link dropped; the client keeps retrying.
    Down(String),
}

/// Invoked once per delivered message.
pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Invoked when the session comes up or the link drops.
pub type LinkCallback = Arc<dyn Fn(LinkEvent) + Send + Sync>;

#[async_trait]
pub trait BrokerClient: Send {
    /// One connection attempt. Returns once the broker has accepted or
    /// refused the session.
    ///
    /// On success the link listener has already seen `LinkEvent::Up`, ahead
    /// of any later link change.
    async fn connect(&mut self) -> BrokerResult<()>;

    /// Shared handle on the client's connected flag.
    fn status(&self) -> LinkStatus;

    fn is_connected(&self) -> bool {
        self.status().is_up()
    }

    /// Register `listener` for link changes. Install before `connect`.
    fn set_link_listener(&mut self, listener: LinkCallback);

    /// Subscribe and wait for the broker's acknowledgement. `on_message`
    /// stays registered for the process lifetime.
    async fn subscribe(
        &mut self,
        filter: &str,
        qos: Qos,
        on_message: MessageCallback,
    ) -> BrokerResult<()>;

    async fn publish(
        &mut self,
        topic: &str,
        qos: Qos,
        retain: bool,
        payload: String,
    ) -> BrokerResult<()>;

    /// Disconnect gracefully, waiting at most `grace` for in-flight work.
    async fn disconnect(&mut self, grace: Duration);
}
