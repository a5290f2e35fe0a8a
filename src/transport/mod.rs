//! The `transport` module is the HTTP surface of the broker.
//!
//! It defines the JSON bodies of the status endpoints and the axum router
//! that turns `/bot`, `/unsubscribeBot`, `/sensor`, `/status` and `/stats`
//! requests into broker operations.

pub mod http;
pub mod message;

pub use http::{AppState, router, start_http_server};

#[cfg(test)]
mod tests;
