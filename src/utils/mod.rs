//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `botsub` application.
//!
//! It centralizes the error taxonomy shared by every layer and the tracing
//! subscriber setup used by the binary and by tests.

pub mod error;
pub mod logging;

pub use error::{BrokerError, StoreError};
