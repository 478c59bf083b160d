//! Connection manager — owns the broker client for the process lifetime.
//!
//! Runs on its own task: connect with retry, subscribe, then idle until
//! shutdown and disconnect. Every outcome reaches the dashboard as a
//! `DashEvent`; nothing here touches dashboard state.
//!
//! Retry policy: transient errors (broker unreachable) retry forever at a
//! fixed delay. Anything else (CONNACK rejection, subscription failure)
//! is reported once as `ConnectionFailed`.
//!
//! Link state reaches the dashboard only through the client's link
//! listener, so `ConnectionEstablished` and `ConnectionLost` arrive in the
//! order the client saw them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{
    BrokerClient, BrokerResult, LinkEvent, LinkStatus, Message, MessageCallback, Subscription,
};
use crate::tui::event::{DashEvent, EventSender};

/// Drives one broker client through its lifecycle.
pub struct ConnectionManager<C> {
    client: C,
    subscriptions: Vec<Subscription>,
    events: EventSender,
    retry_delay: Duration,
    disconnect_grace: Duration,
}

/// What the rest of the process may do with the connection: ask whether
/// it is up, and end it.
pub struct ConnectionHandle {
    status: LinkStatus,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<C: BrokerClient + 'static> ConnectionManager<C> {
    pub fn new(
        client: C,
        subscriptions: Vec<Subscription>,
        events: EventSender,
        retry_delay: Duration,
        disconnect_grace: Duration,
    ) -> Self {
        Self {
            client,
            subscriptions,
            events,
            retry_delay,
            disconnect_grace,
        }
    }

    /// Start the manager on its own task.
    pub fn spawn(self) -> ConnectionHandle {
        let status = self.client.status();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ConnectionHandle {
            status,
            shutdown,
            task,
        }
    }

    /// Full lifecycle. Returns after shutdown has been requested and the
    /// client disconnected.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let established = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => None,
            result = self.establish() => Some(result),
        };

        match established {
            None => debug!("shutdown requested while connecting"),
            Some(result) => {
                if let Err(err) = result {
                    warn!(%err, "connection failed");
                    self.events.send(DashEvent::ConnectionFailed(err.to_string()));
                }
                stopped(&mut shutdown).await;
            }
        }

        self.client.disconnect(self.disconnect_grace).await;
        info!("disconnected from broker");
    }

    /// Connect, then subscribe to everything requested. The client's `Up`
    /// for the first CONNACK reports success.
    async fn establish(&mut self) -> BrokerResult<()> {
        self.install_link_listener();
        let attempts = self.connect_with_retry().await?;
        info!(attempts, up = self.client.is_connected(), "broker connection established");

        let on_message = self.message_callback();
        for sub in &self.subscriptions {
            self.client
                .subscribe(&sub.filter, sub.qos, Arc::clone(&on_message))
                .await?;
        }
        Ok(())
    }

    /// Attempt until success or a non-transient error. Returns the number
    /// of attempts made.
    pub async fn connect_with_retry(&mut self) -> BrokerResult<u32> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.connect().await {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_transient() => {
                    warn!(attempt, %err, delay = ?self.retry_delay, "connect failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn message_callback(&self) -> MessageCallback {
        let events = self.events.clone();
        Arc::new(move |message: Message| {
            events.send(DashEvent::MessageReceived(message));
        })
    }

    fn install_link_listener(&mut self) {
        let events = self.events.clone();
        self.client.set_link_listener(Arc::new(move |link: LinkEvent| {
            events.send(match link {
                LinkEvent::Up => DashEvent::ConnectionEstablished,
                LinkEvent::Down(reason) => DashEvent::ConnectionLost(reason),
            });
        }));
    }
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl ConnectionHandle {
    /// Asks the client's own link flag.
    pub fn is_connected(&self) -> bool {
        self.status.is_up()
    }

    /// Ask the manager to disconnect and wait for it, at most `grace`
    /// beyond the client's own disconnect grace. Aborts on overrun.
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        // The client gets `grace` to disconnect; allow the same again for
        // the driver to wind down before giving up.
        match tokio::time::timeout(grace * 2, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "connection task ended abnormally"),
            Err(_) => {
                warn!("connection task did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake;
