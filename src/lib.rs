//! # botsub
//!
//! `botsub` is a durable publish/subscribe delivery engine for a fleet of
//! networked bots. Bots subscribe to a topic (optionally scoped to a sector)
//! over HTTP; sensors publish messages that are delivered to every bot
//! subscribed at publish time, at least once, across process crashes.
//!
//! ## Core Modules
//!
//! - `broker`: subscription registry, write-ahead logs, publish coordinator,
//!   delivery worker and startup recovery.
//! - `client`: the HTTP client that notifies bots.
//! - `config`: loading and merging server configuration.
//! - `persistence`: the sled-backed table store.
//! - `server`: startup order and the lifetime of a running broker.
//! - `transport`: the HTTP surface.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod server;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
