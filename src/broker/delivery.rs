//! Delivery worker
//!
//! One `deliver` call per (bot, request). The first attempt decides the path:
//! - acknowledged: the resilience entry is resolved;
//! - timed out: resend until a matching acknowledgment arrives, pausing for
//!   the policy backoff after any resend that failed without timing out;
//! - any other failure: logged and left for the next recovery pass, the
//!   resilience entry stays in place.
//!
//! Every wait observes the shutdown token; a cancelled delivery keeps its
//! entry.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::logs::ResilienceLog;
use crate::broker::message::{Acknowledgment, Bot, PublishRequest, ResilienceKey};
use crate::broker::retry::RetryPolicy;
use crate::client::{BotClient, NotifyError};
use crate::utils::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The bot acknowledged and the entry was resolved.
    Acknowledged,
    /// The first attempt failed without timing out; the entry stays.
    Deferred,
    /// The retry policy ran out of attempts; the entry stays.
    Abandoned,
    /// Shutdown was requested while delivering; the entry stays.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DeliveryWorker {
    client: BotClient,
    resilience: ResilienceLog,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl DeliveryWorker {
    pub fn new(
        client: BotClient,
        resilience: ResilienceLog,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            resilience,
            policy,
            shutdown,
        }
    }

    /// Delivers `request` to `bot`. Only a store failure is an error.
    pub async fn deliver(
        &self,
        bot: Bot,
        request: PublishRequest,
    ) -> Result<DeliveryOutcome, BrokerError> {
        let Some(first) = self.attempt(&bot, &request).await else {
            return Ok(DeliveryOutcome::Cancelled);
        };

        match first {
            Ok(ack) => {
                if !ack.matches(&bot, &request) {
                    warn!(
                        bot_id = %bot.id,
                        acked_by = %ack.bot_id,
                        sensor_id = %request.id,
                        "acknowledgment does not match the delivery"
                    );
                }
                self.resilience
                    .resolve(&ResilienceKey::acknowledged(&ack, &request))?;
                info!(bot_id = %bot.id, sensor_id = %request.id, "delivery acknowledged");
                Ok(DeliveryOutcome::Acknowledged)
            }
            Err(e) if e.is_timeout() => {
                debug!(bot_id = %bot.id, sensor_id = %request.id, "first attempt timed out, retrying");
                self.retry(&bot, &request).await
            }
            Err(e) => {
                warn!(
                    bot_id = %bot.id,
                    sensor_id = %request.id,
                    error = %e,
                    "delivery failed, deferring to recovery"
                );
                Ok(DeliveryOutcome::Deferred)
            }
        }
    }

    async fn retry(
        &self,
        bot: &Bot,
        request: &PublishRequest,
    ) -> Result<DeliveryOutcome, BrokerError> {
        let mut attempt = 0;
        loop {
            if !self.policy.allows(attempt) {
                warn!(
                    bot_id = %bot.id,
                    sensor_id = %request.id,
                    attempts = attempt,
                    "retry attempts exhausted"
                );
                return Ok(DeliveryOutcome::Abandoned);
            }

            let Some(result) = self.attempt(bot, request).await else {
                return Ok(DeliveryOutcome::Cancelled);
            };

            match result {
                Ok(ack) if ack.matches(bot, request) => {
                    self.resilience.resolve(&ResilienceKey::new(bot, request))?;
                    info!(
                        bot_id = %bot.id,
                        sensor_id = %request.id,
                        resends = attempt + 1,
                        "delivery acknowledged after retry"
                    );
                    return Ok(DeliveryOutcome::Acknowledged);
                }
                Err(e) if e.is_timeout() => {
                    debug!(bot_id = %bot.id, sensor_id = %request.id, "resend timed out");
                }
                other => {
                    debug!(
                        bot_id = %bot.id,
                        sensor_id = %request.id,
                        outcome = ?other.map(|ack| ack.bot_id),
                        "resend not acknowledged, backing off"
                    );
                    let delay = self.policy.delay(attempt);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(DeliveryOutcome::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            attempt += 1;
        }
    }

    /// One send, or `None` if shutdown won the race.
    async fn attempt(
        &self,
        bot: &Bot,
        request: &PublishRequest,
    ) -> Option<Result<Acknowledgment, NotifyError>> {
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = self.client.notify(bot, request) => Some(result),
        }
    }
}
