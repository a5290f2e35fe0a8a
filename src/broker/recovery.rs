//! Startup recovery
//!
//! Before the broker accepts new work it rebuilds the deliveries that were in
//! flight when the previous process stopped:
//! 1. every pending request is paired with the resilience entries it owns
//!    (same sensor id, same message);
//! 2. each entry's bot is looked up in the restored registry, and a missing
//!    bot aborts startup;
//! 3. the deliveries are resumed in the background and each request is
//!    retired once they resolve. Requests without entries are retired at once.
//!
//! Entries owned by no pending request are left over from a deferred first
//! attempt whose request was already retired. They are grouped back into
//! requests and redelivered the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::engine::{Broker, PublishReport};
use crate::broker::message::{Bot, PublishRequest, ResilienceEntry};
use crate::utils::BrokerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryBatch {
    pub request: PublishRequest,
    pub bots: Vec<Bot>,
    /// Whether `request` still has an entry in the pending log.
    pub pending: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub batches: Vec<RecoveryBatch>,
    /// Leftover entries skipped because their bot no longer exists.
    pub skipped: usize,
}

impl RecoveryPlan {
    pub fn build(
        requests: Vec<PublishRequest>,
        entries: Vec<ResilienceEntry>,
        find_bot: impl Fn(&str) -> Option<Bot>,
    ) -> Result<Self, BrokerError> {
        let mut plan = RecoveryPlan::default();
        let mut remaining = entries;

        for request in requests {
            let (owned, rest): (Vec<_>, Vec<_>) =
                remaining.into_iter().partition(|e| e.belongs_to(&request));
            remaining = rest;

            let bots = owned
                .iter()
                .map(|entry| {
                    find_bot(&entry.bot_id).ok_or_else(|| BrokerError::OrphanedEntry {
                        bot_id: entry.bot_id.clone(),
                        sensor_id: entry.sensor_id.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            plan.batches.push(RecoveryBatch {
                request,
                bots,
                pending: true,
            });
        }

        let mut leftovers: BTreeMap<(String, String), RecoveryBatch> = BTreeMap::new();
        for entry in remaining {
            let Some(bot) = find_bot(&entry.bot_id) else {
                warn!(
                    bot_id = %entry.bot_id,
                    sensor_id = %entry.sensor_id,
                    "leftover resilience entry names an unknown bot, skipping"
                );
                plan.skipped += 1;
                continue;
            };

            leftovers
                .entry((entry.sensor_id.clone(), entry.message.clone()))
                .or_insert_with(|| RecoveryBatch {
                    request: entry.to_request(),
                    bots: Vec::new(),
                    pending: false,
                })
                .bots
                .push(bot);
        }
        plan.batches.extend(leftovers.into_values());

        Ok(plan)
    }

    pub fn deliveries(&self) -> usize {
        self.batches.iter().map(|b| b.bots.len()).sum()
    }
}

impl Broker {
    /// Reads both logs and resolves every entry's bot.
    pub fn plan_recovery(&self) -> Result<RecoveryPlan, BrokerError> {
        let requests = self.pending().load()?;
        let entries = self.resilience().load()?;
        info!(
            pending = requests.len(),
            entries = entries.len(),
            "loaded write-ahead logs"
        );

        RecoveryPlan::build(requests, entries, |id| self.registry().find_bot(id))
    }

    /// Resumes every batch concurrently and waits for all of them.
    pub async fn resume(&self, plan: RecoveryPlan) -> Result<(), BrokerError> {
        let batches = plan.batches.len();
        futures::future::try_join_all(
            plan.batches
                .into_iter()
                .map(|batch| self.resume_batch(batch)),
        )
        .await?;
        info!(batches, "recovery finished");
        Ok(())
    }

    async fn resume_batch(&self, batch: RecoveryBatch) -> Result<(), BrokerError> {
        let report = if batch.bots.is_empty() {
            PublishReport::default()
        } else {
            self.fan_out(batch.bots, &batch.request).await?
        };

        if batch.pending {
            self.retire(&batch.request, &report)?;
        }
        Ok(())
    }

    /// Plans recovery, then resumes it on a background task. Returns once the
    /// logs are read, so intake can start while deliveries are retried.
    pub fn recover(self: &Arc<Self>) -> Result<JoinHandle<Result<(), BrokerError>>, BrokerError> {
        let plan = self.plan_recovery()?;
        info!(
            batches = plan.batches.len(),
            deliveries = plan.deliveries(),
            skipped = plan.skipped,
            "resuming interrupted deliveries"
        );

        let broker = Arc::clone(self);
        Ok(tokio::spawn(async move { broker.resume(plan).await }))
    }
}
