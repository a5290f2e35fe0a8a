use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `alivectx` in context-aware mode, `alive` otherwise.
    pub status: String,
    #[serde(rename = "totbot")]
    pub total_bots: usize,
    /// Sensor requests accepted but not yet handed to the coordinator.
    #[serde(rename = "totsens")]
    pub queued_requests: usize,
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /stats`: service times in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(rename = "timelist")]
    pub times_ms: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
