//! The `error` module defines the error types used within `botsub`.
//!
//! Two layers exist:
//! - [`StoreError`] covers every failure of the durable table store (sled I/O
//!   and record encoding).
//! - [`BrokerError`] is what the broker, the recovery pass and the binary deal
//!   in. Anything that reaches `main` as a `BrokerError` terminates the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: sled::Error,
    },

    #[error("store operation on table '{table}' failed: {source}")]
    Sled {
        table: &'static str,
        #[source]
        source: sled::Error,
    },

    #[error("failed to encode record for table '{table}': {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode record from table '{table}': {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("resilience entry for sensor '{sensor_id}' names unknown bot '{bot_id}'")]
    OrphanedEntry { bot_id: String, sensor_id: String },

    #[error("topic '{0}' is not one of the configured topics")]
    UnknownTopic(String),

    #[error("invalid mode argument '{0}': the only accepted value is 'ctx'")]
    InvalidMode(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to build bot http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("http server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BrokerError {
    /// Whether the error leaves the broker unable to keep its durability
    /// guarantees. Request-level validation errors are the only non-fatal kind.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BrokerError::UnknownTopic(_))
    }
}
