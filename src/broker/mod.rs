//! The `broker` module is the delivery engine.
//!
//! - `registry`: which bots are subscribed to which topic (or topic+sector).
//! - `logs`: the pending request log and the resilience log.
//! - `engine`: the `Broker` coordinator (accept, publish, intake loop).
//! - `delivery`: the per-(bot, request) worker and its retry loop.
//! - `recovery`: startup replay of interrupted deliveries.

pub mod delivery;
pub mod engine;
pub mod logs;
pub mod message;
pub mod queue;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod stats;

pub use engine::{Broker, PublishReport};
