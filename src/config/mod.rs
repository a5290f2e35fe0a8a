mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::utils::BrokerError;
use settings::PartialSettings;

pub use settings::{
    BrokerSettings, DeliverySettings, LoggingSettings, PersistenceSettings, ServerSettings,
    Settings,
};

/// The positional argument that switches the broker to context-aware mode.
pub const CONTEXT_AWARE_ARG: &str = "ctx";

/// Loads the configuration from `config/default` and environment variables
/// (`BOTSUB__SECTION__KEY`), merged over the default values.
///
/// `BOTSUB__BROKER__TOPICS` takes a comma separated list.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit configuration file base name.
/// The file is optional.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("BOTSUB")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("broker.topics")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        broker: BrokerSettings {
            context_aware: partial
                .broker
                .as_ref()
                .and_then(|b| b.context_aware)
                .unwrap_or(default.broker.context_aware),
            topics: partial
                .broker
                .as_ref()
                .and_then(|b| b.topics.clone())
                .unwrap_or(default.broker.topics),
        },
        delivery: DeliverySettings {
            bot_port: partial
                .delivery
                .as_ref()
                .and_then(|d| d.bot_port)
                .unwrap_or(default.delivery.bot_port),
            request_timeout_ms: partial
                .delivery
                .as_ref()
                .and_then(|d| d.request_timeout_ms)
                .unwrap_or(default.delivery.request_timeout_ms),
            retry_backoff_ms: partial
                .delivery
                .as_ref()
                .and_then(|d| d.retry_backoff_ms)
                .unwrap_or(default.delivery.retry_backoff_ms),
            max_attempts: partial
                .delivery
                .as_ref()
                .and_then(|d| d.max_attempts)
                .or(default.delivery.max_attempts),
        },
        persistence: PersistenceSettings {
            path: partial
                .persistence
                .as_ref()
                .and_then(|p| p.path.clone())
                .unwrap_or(default.persistence.path),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}

/// Interprets the startup mode argument.
///
/// `ctx` turns context-aware subscriptions on, no argument keeps whatever the
/// configuration says, and any other value is rejected.
pub fn context_aware_from_arg(arg: Option<&str>, configured: bool) -> Result<bool, BrokerError> {
    match arg {
        None => Ok(configured),
        Some(CONTEXT_AWARE_ARG) => Ok(true),
        Some(other) => Err(BrokerError::InvalidMode(other.to_string())),
    }
}
