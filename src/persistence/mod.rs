//! The `persistence` module is the durable table store behind the broker.
//!
//! It exposes three named tables (`bots`, `sensorsRequest`, `resilience`),
//! each a `sled` tree, with the operations the broker needs: put,
//! delete-by-key, point lookup and full scan. Records describe their own table
//! and key through the [`Record`] trait; keys are encoded as JSON so composite
//! keys stay unambiguous no matter what the ids contain.

pub mod sled_store;

pub use sled_store::{Persistence, Record};
