use std::time::Duration;

use serde::Deserialize;

use crate::broker::retry::RetryPolicy;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub delivery: DeliverySettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Where the HTTP surface binds.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Subscription behaviour of the broker.
///
/// `context_aware` keys subscriptions by `(topic, sector)` instead of topic
/// alone. `topics` is the fixed set of topics bots and sensors may use.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub context_aware: bool,
    pub topics: Vec<String>,
}

/// Outbound delivery to bots.
#[derive(Debug, Deserialize, Clone)]
pub struct DeliverySettings {
    pub bot_port: u16,
    pub request_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_attempts: Option<u32>,
}

impl DeliverySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub delivery: Option<PartialDeliverySettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub context_aware: Option<bool>,
    pub topics: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialDeliverySettings {
    pub bot_port: Option<u16>,
    pub request_timeout_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            broker: BrokerSettings {
                context_aware: false,
                topics: vec![
                    "temperature".to_string(),
                    "humidity".to_string(),
                    "motion".to_string(),
                ],
            },
            delivery: DeliverySettings {
                bot_port: 5001,
                request_timeout_ms: 5_000,
                retry_backoff_ms: 20_000,
                max_attempts: None,
            },
            persistence: PersistenceSettings {
                path: "botsub_db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
