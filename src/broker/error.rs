//! Broker-client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Network-level failure (refused, unreachable, reset). Worth retrying.
    #[error("broker unreachable: {0}")]
    Transient(String),

    #[error("broker rejected connection: {0}")]
    Rejected(String),

    #[error("subscription to {filter} failed: {reason}")]
    Subscribe { filter: String, reason: String },

    #[error("client request failed: {0}")]
    Client(String),

    #[error("not connected")]
    NotConnected,
}

impl BrokerError {
    /// Whether reconnecting after this error can succeed without
    /// changing configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transient(_))
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
