//! The `client` module talks to bots.
//!
//! It provides [`BotClient`], which POSTs a notification to a bot's endpoint
//! and decodes the acknowledgment it answers with. Failures are classified
//! so the delivery worker can tell a timeout (retry) from anything else.

pub mod bot_client;
pub use bot_client::{BotClient, NotifyError};
