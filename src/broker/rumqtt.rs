//! `BrokerClient` on top of rumqttc.
//!
//! `connect` drives a fresh event loop until CONNACK and reports the link
//! up. After that a driver task owns the event loop: it routes PUBLISH
//! packets to the registered callbacks, hands SUBACKs back to the pending
//! `subscribe` call, and keeps polling through link drops (rumqttc
//! reconnects on the next poll).

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubAck, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{BrokerError, BrokerResult};
use super::suback::{resubscribe_owner, Owner, SubackLedger};
use super::{
    filter_matches, BrokerClient, LinkCallback, LinkEvent, LinkStatus, Message, MessageCallback,
    Qos,
};

/// Connection parameters for `RumqttClient`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Pause between polls after the established link drops.
    pub reconnect_delay: Duration,
    /// Capacity of rumqttc's request queue.
    pub request_capacity: usize,
}

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

struct Route {
    filter: String,
    qos: Qos,
    on_message: MessageCallback,
    /// The broker has acknowledged this subscription at least once.
    confirmed: bool,
}

/// State shared between the client handle and its driver task.
#[derive(Default)]
struct Shared {
    status: LinkStatus,
    routes: RwLock<Vec<Route>>,
    link: RwLock<Option<LinkCallback>>,
    /// Held while a SUBSCRIBE is queued so ledger order is queue order.
    subacks: Mutex<SubackLedger>,
}

impl Shared {
    /// Deliver to the first route whose filter matches.
    fn dispatch(&self, topic_name: &str, payload: &[u8]) {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        match routes.iter().find(|r| filter_matches(&r.filter, topic_name)) {
            Some(route) => (route.on_message)(Message {
                topic: topic_name.to_string(),
                payload: String::from_utf8_lossy(payload).into_owned(),
            }),
            None => debug!(topic = topic_name, "publish matched no subscription"),
        }
    }

    /// Flip the connected flag, notifying the link listener on change.
    fn set_link(&self, up: bool, reason: impl FnOnce() -> String) {
        if self.status.set(up) == up {
            return;
        }
        let listener = self.link.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listener.as_ref() {
            listener(if up { LinkEvent::Up } else { LinkEvent::Down(reason()) });
        }
    }
}

/// Production broker client.
pub struct RumqttClient {
    options: ClientOptions,
    shared: Arc<Shared>,
    client: Option<AsyncClient>,
    subacks: Option<mpsc::UnboundedReceiver<SubAck>>,
    driver: Option<JoinHandle<()>>,
}

impl RumqttClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared::default()),
            client: None,
            subacks: None,
            driver: None,
        }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(
            self.options.client_id.clone(),
            self.options.host.clone(),
            self.options.port,
        );
        opts.set_keep_alive(self.options.keep_alive);
        opts.set_clean_session(true);
        opts
    }

    fn confirm(&self, filter: &str) {
        let mut routes = self.shared.routes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(route) = routes.iter_mut().find(|r| r.filter == filter) {
            route.confirmed = true;
        }
    }

    fn forget(&self, filter: &str) {
        self.shared
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|r| r.filter != filter);
    }
}

fn classify(err: ConnectionError) -> BrokerError {
    match err {
        ConnectionError::ConnectionRefused(code) => BrokerError::Rejected(format!("{code:?}")),
        other => BrokerError::Transient(other.to_string()),
    }
}

fn rejected(ack: &SubAck) -> bool {
    ack.return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
}

/// Poll until the broker answers CONNECT.
async fn await_connack(eventloop: &mut EventLoop) -> BrokerResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BrokerError::Rejected(format!("{:?}", ack.code)))
                };
            }
            Ok(_) => {}
            Err(err) => return Err(classify(err)),
        }
    }
}

/// Driver loop: owns the event loop for the rest of the session.
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    subacks: mpsc::UnboundedSender<SubAck>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.dispatch(&publish.topic, &publish.payload);
            }
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                shared.subacks.lock().unwrap_or_else(PoisonError::into_inner).sent(pkid);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let owner = shared
                    .subacks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .acked(ack.pkid);
                match owner {
                    Some(Owner::Caller) => {
                        let _ = subacks.send(ack);
                    }
                    Some(Owner::Resubscribe) if rejected(&ack) => {
                        warn!(pkid = ack.pkid, "re-subscription rejected by broker");
                    }
                    Some(Owner::Resubscribe) => {}
                    None => debug!(pkid = ack.pkid, "SUBACK for unknown request"),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(session_present = ack.session_present, "reconnected to broker");
                resubscribe(&client, &shared, ack.session_present);
                shared.set_link(true, String::new);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent, driver exiting");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "broker link lost");
                shared.set_link(false, || err.to_string());
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }

    shared.status.set(false);
}

/// Re-issue what the new session is missing.
fn resubscribe(client: &AsyncClient, shared: &Shared, session_present: bool) {
    let mut ledger = shared.subacks.lock().unwrap_or_else(PoisonError::into_inner);
    let caller_lost = ledger.reconnected();
    let routes = shared.routes.read().unwrap_or_else(PoisonError::into_inner);
    for route in routes.iter() {
        let Some(owner) = resubscribe_owner(route.confirmed, session_present, caller_lost) else {
            continue;
        };
        match client.try_subscribe(route.filter.clone(), route.qos.into()) {
            Ok(()) => ledger.queued(owner),
            Err(err) => warn!(filter = %route.filter, %err, "re-subscribe failed"),
        }
    }
}

#[async_trait]
impl BrokerClient for RumqttClient {
    async fn connect(&mut self) -> BrokerResult<()> {
        if self.driver.is_some() {
            return Ok(());
        }

        let (client, mut eventloop) =
            AsyncClient::new(self.mqtt_options(), self.options.request_capacity);
        await_connack(&mut eventloop).await?;
        info!(
            host = %self.options.host,
            port = self.options.port,
            client_id = %self.options.client_id,
            "connected to broker"
        );

        self.shared.set_link(true, String::new);
        let (suback_tx, suback_rx) = mpsc::unbounded_channel();
        self.driver = Some(tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&self.shared),
            suback_tx,
            self.options.reconnect_delay,
        )));
        self.client = Some(client);
        self.subacks = Some(suback_rx);
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.shared.status.clone()
    }

    fn set_link_listener(&mut self, listener: LinkCallback) {
        *self.shared.link.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    async fn subscribe(
        &mut self,
        filter: &str,
        qos: Qos,
        on_message: MessageCallback,
    ) -> BrokerResult<()> {
        let (Some(client), Some(subacks)) = (self.client.as_ref(), self.subacks.as_mut()) else {
            return Err(BrokerError::NotConnected);
        };

        // Register first: retained messages can arrive right after SUBACK.
        self.shared
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Route {
                filter: filter.to_string(),
                qos,
                on_message,
                confirmed: false,
            });

        let queued = {
            let mut ledger = self.shared.subacks.lock().unwrap_or_else(PoisonError::into_inner);
            let queued = client.try_subscribe(filter, qos.into());
            if queued.is_ok() {
                ledger.queued(Owner::Caller);
            }
            queued
        };

        let outcome = match queued {
            Err(err) => Err(BrokerError::Client(err.to_string())),
            Ok(()) => match subacks.recv().await {
                None => Err(BrokerError::NotConnected),
                Some(ack) if rejected(&ack) => {
                    Err(BrokerError::Subscribe {
                        filter: filter.to_string(),
                        reason: "rejected by broker".into(),
                    })
                }
                Some(_) => Ok(()),
            },
        };

        match &outcome {
            Ok(()) => {
                self.confirm(filter);
                info!(filter, %qos, "subscribed");
            }
            Err(_) => self.forget(filter),
        }
        outcome
    }

    async fn publish(
        &mut self,
        topic_name: &str,
        qos: Qos,
        retain: bool,
        payload: String,
    ) -> BrokerResult<()> {
        let client = self.client.as_ref().ok_or(BrokerError::NotConnected)?;
        client
            .publish(topic_name, qos.into(), retain, payload.into_bytes())
            .await
            .map_err(|err| BrokerError::Client(err.to_string()))
    }

    async fn disconnect(&mut self, grace: Duration) {
        if let Some(client) = self.client.take() {
            match tokio::time::timeout(grace, client.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(%err, "disconnect request failed"),
                Err(_) => debug!("disconnect request timed out"),
            }
        }
        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(grace, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        self.subacks = None;
        self.shared.status.set(false);
    }
}

impl Drop for RumqttClient {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
