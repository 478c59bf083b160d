//! Test-message generator: publishes `Hello, world! - N` on `test0`..`test5`
//! once a second until Ctrl-C.
//!
//! Broker comes from `MQTT_BROKER` (default `tcp://localhost:1883`).

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{info, warn};

use mqtt_tui::broker::rumqtt::ClientOptions;
use mqtt_tui::broker::{BrokerClient, Qos, RumqttClient};
use mqtt_tui::config::BrokerAddress;

const DEFAULT_BROKER: &str = "tcp://localhost:1883";
const TOPIC_COUNT: u32 = 6;
const PUBLISH_INTERVAL: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mqtt_writer=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let broker = std::env::var("MQTT_BROKER").unwrap_or_else(|_| DEFAULT_BROKER.into());
    let address = BrokerAddress::parse(&broker)?;

    let mut client = RumqttClient::new(ClientOptions {
        host: address.host.clone(),
        port: address.port,
        client_id: format!("mqtt-writer-{}", std::process::id()),
        keep_alive: Duration::from_secs(30),
        reconnect_delay: Duration::from_secs(1),
        request_capacity: 16,
    });
    client
        .connect()
        .await
        .with_context(|| format!("could not connect to {address}"))?;
    info!(%address, "publishing test messages");

    let mut ticker = tokio::time::interval(PUBLISH_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !client.is_connected() {
                    warn!("broker link down, skipping this tick");
                    continue;
                }
                let (topic, payload) = {
                    let mut rng = rand::thread_rng();
                    (
                        format!("test{}", rng.gen_range(0..TOPIC_COUNT)),
                        format!("Hello, world! - {}", rng.gen_range(0..100)),
                    )
                };
                match client.publish(&topic, Qos::AtMostOnce, false, payload).await {
                    Ok(()) => info!(%topic, "published"),
                    Err(err) => warn!(%topic, %err, "publish failed"),
                }
            }
        }
    }

    client.disconnect(DISCONNECT_GRACE).await;
    info!("stopped");
    Ok(())
}
