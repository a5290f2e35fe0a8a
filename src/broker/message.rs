//! Records exchanged by the broker
//!
//! Wire names follow the HTTP protocol spoken by bots and sensors
//! (`current_sector`, `ipaddr`, `msg`, `type`, `pbrtx`); the longer field
//! names are accepted as aliases on input.
//!
//! Three of these types are also durable records:
//! - `Bot` lives in the `bots` table, keyed by id.
//! - `PublishRequest` lives in the `sensorsRequest` table, keyed by
//!   `(id, message)`.
//! - `ResilienceEntry` lives in the `resilience` table, keyed by the
//!   structured [`ResilienceKey`] `(bot_id, sensor_id, message)`.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::persistence::Record;
use crate::persistence::sled_store::{BOTS_TABLE, REQUESTS_TABLE, RESILIENCE_TABLE};

const NULL_FIELD: &str = "null";

/// A subscriber endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(rename = "current_sector", alias = "sector", default)]
    pub sector: String,
    #[serde(rename = "ipaddr", alias = "address", default)]
    pub address: String,
}

impl Bot {
    /// The sentinel returned after an unsubscribe: every field is `"null"`.
    pub fn null() -> Self {
        Self {
            id: NULL_FIELD.to_string(),
            topic: NULL_FIELD.to_string(),
            sector: NULL_FIELD.to_string(),
            address: NULL_FIELD.to_string(),
        }
    }

    /// Assigns a fresh id when the bot was registered without one.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = generate_id();
        }
    }
}

impl Record for Bot {
    const TABLE: &'static str = BOTS_TABLE;
    type Key = String;

    fn key(&self) -> Self::Key {
        self.id.clone()
    }
}

/// A sensor message to fan out to every matching subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(rename = "msg", alias = "message", default)]
    pub message: String,
    #[serde(rename = "type", alias = "topic", default)]
    pub topic: String,
    #[serde(rename = "current_sector", alias = "sector", default)]
    pub sector: String,
    #[serde(rename = "pbrtx", alias = "isRetransmission", default)]
    pub is_retransmission: bool,
}

impl PublishRequest {
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = generate_id();
        }
    }

    /// The text echoed back to the sensor once the request is accepted.
    pub fn ack_text(&self) -> String {
        format!("Ack on message : {} on sensor :{}", self.message, self.id)
    }
}

impl Record for PublishRequest {
    const TABLE: &'static str = REQUESTS_TABLE;
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.id.clone(), self.message.clone())
    }
}

/// Identity of one outstanding delivery obligation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResilienceKey {
    pub bot_id: String,
    pub sensor_id: String,
    pub message: String,
}

impl ResilienceKey {
    pub fn new(bot: &Bot, request: &PublishRequest) -> Self {
        Self {
            bot_id: bot.id.clone(),
            sensor_id: request.id.clone(),
            message: request.message.clone(),
        }
    }

    /// The key an acknowledgment resolves: bot and message as reported by the
    /// bot, sensor id from the request being delivered.
    pub fn acknowledged(ack: &Acknowledgment, request: &PublishRequest) -> Self {
        Self {
            bot_id: ack.bot_id.clone(),
            sensor_id: request.id.clone(),
            message: ack.message.clone(),
        }
    }
}

/// Durable proof that `bot_id` has not yet acknowledged `message` from
/// `sensor_id`. Topic and sector are kept so the request can be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceEntry {
    pub bot_id: String,
    pub sensor_id: String,
    pub message: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub sector: String,
}

impl ResilienceEntry {
    pub fn new(bot: &Bot, request: &PublishRequest) -> Self {
        Self {
            bot_id: bot.id.clone(),
            sensor_id: request.id.clone(),
            message: request.message.clone(),
            topic: request.topic.clone(),
            sector: request.sector.clone(),
        }
    }

    /// Whether this obligation was created while publishing `request`.
    pub fn belongs_to(&self, request: &PublishRequest) -> bool {
        self.sensor_id == request.id && self.message == request.message
    }

    /// Rebuilds the publish request this entry was created for.
    pub fn to_request(&self) -> PublishRequest {
        PublishRequest {
            id: self.sensor_id.clone(),
            message: self.message.clone(),
            topic: self.topic.clone(),
            sector: self.sector.clone(),
            is_retransmission: false,
        }
    }
}

impl Record for ResilienceEntry {
    const TABLE: &'static str = RESILIENCE_TABLE;
    type Key = ResilienceKey;

    fn key(&self) -> Self::Key {
        ResilienceKey {
            bot_id: self.bot_id.clone(),
            sensor_id: self.sensor_id.clone(),
            message: self.message.clone(),
        }
    }
}

/// What a bot answers once it has received a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    #[serde(rename = "id")]
    pub bot_id: String,
    pub message: String,
}

impl Acknowledgment {
    pub fn matches(&self, bot: &Bot, request: &PublishRequest) -> bool {
        self.bot_id == bot.id && self.message == request.message
    }
}

/// Payload POSTed to a bot for one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub msg: String,
    #[serde(rename = "botId")]
    pub bot_id: String,
    pub bot_cs: String,
    pub sensor: String,
    pub sensor_cs: String,
    pub topic: String,
}

impl Notification {
    pub fn new(bot: &Bot, request: &PublishRequest) -> Self {
        Self {
            msg: request.message.clone(),
            bot_id: bot.id.clone(),
            bot_cs: bot.sector.clone(),
            sensor: request.id.clone(),
            sensor_cs: request.sector.clone(),
            topic: bot.topic.clone(),
        }
    }
}

/// Reads an optional string, treating `null` like a missing field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
