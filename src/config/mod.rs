//! Dashboard configuration — broker address, subscriptions, tuning knobs.
//!
//! Optional YAML file (`--config`), e.g.:
//!
//! ```yaml
//! client_id: lab-monitor
//! qos: 1
//! keep_alive_secs: 30
//! retry_delay_ms: 1000
//! disconnect_grace_ms: 250
//! channel_capacity: 64
//! ```
//!
//! Resolution: CLI flag → config file → built-in default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::broker::rumqtt::ClientOptions;
use crate::broker::{self, Qos, Subscription};

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID: &str = "mqtt-tui";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_DISCONNECT_GRACE_MS: u64 = 250;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid broker address {address:?}: {reason}")]
    BrokerAddress { address: String, reason: String },

    #[error("at least one topic filter is required")]
    NoTopics,

    #[error("invalid topic filter {0:?}")]
    TopicFilter(String),

    #[error("invalid QoS level {0} (expected 0, 1 or 2)")]
    Qos(u8),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Where the broker lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `host`, `host:port`, `tcp://host:port` and `mqtt://host:port`.
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::BrokerAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let rest = match address.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {scheme:?}"))),
            None => address,
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
                if port == 0 {
                    return Err(invalid("port must be non-zero"));
                }
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.contains(['/', ' ']) {
            return Err(invalid("host contains illegal characters"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Optional settings file. Every field falls back to a built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub qos: Option<u8>,
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub disconnect_grace_ms: Option<u64>,
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub qos: Option<u8>,
    pub client_id: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerAddress,
    pub subscriptions: Vec<Subscription>,
    pub client_id: String,
    pub keep_alive: Duration,
    pub retry_delay: Duration,
    pub disconnect_grace: Duration,
    pub channel_capacity: usize,
}

impl Settings {
    pub fn resolve(
        broker: &str,
        topics: &[String],
        overrides: Overrides,
        file: FileConfig,
    ) -> Result<Self, ConfigError> {
        let broker = BrokerAddress::parse(broker)?;

        if topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        if let Some(bad) = topics.iter().find(|t| !broker::is_valid_filter(t)) {
            return Err(ConfigError::TopicFilter(bad.clone()));
        }

        let level = overrides.qos.or(file.qos).unwrap_or(0);
        let qos = Qos::try_from(level).map_err(ConfigError::Qos)?;

        let mut subscriptions: Vec<Subscription> = Vec::with_capacity(topics.len());
        for filter in topics {
            if !subscriptions.iter().any(|s| &s.filter == filter) {
                subscriptions.push(Subscription {
                    filter: filter.clone(),
                    qos,
                });
            }
        }

        let keep_alive_secs = file.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS);
        if keep_alive_secs == 0 {
            return Err(ConfigError::Zero {
                field: "keep_alive_secs",
            });
        }
        let channel_capacity = file.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        if channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "channel_capacity",
            });
        }

        Ok(Self {
            broker,
            subscriptions,
            client_id: overrides
                .client_id
                .or(file.client_id)
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.into()),
            keep_alive: Duration::from_secs(keep_alive_secs),
            retry_delay: Duration::from_millis(
                file.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
            disconnect_grace: Duration::from_millis(
                file.disconnect_grace_ms.unwrap_or(DEFAULT_DISCONNECT_GRACE_MS),
            ),
            channel_capacity,
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            host: self.broker.host.clone(),
            port: self.broker.port,
            client_id: self.client_id.clone(),
            keep_alive: self.keep_alive,
            reconnect_delay: self.retry_delay,
            request_capacity: self.channel_capacity,
        }
    }
}
