//! Broker engine
//!
//! The `Broker` ties the subscription registry, the two write-ahead logs, the
//! intake queue and the delivery worker together:
//! - `accept` persists a sensor request and queues it;
//! - `run_intake` drains the queue, running one coordinator task per request;
//! - `publish` snapshots subscribers, records every obligation, fans out and
//!   retires the request once all deliveries resolved.
//!
//! Ordering note: for one request every resilience entry is durable before
//! the first delivery starts. Different requests fan out concurrently with no
//! ordering between them.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broker::delivery::{DeliveryOutcome, DeliveryWorker};
use crate::broker::logs::{PendingLog, ResilienceLog};
use crate::broker::message::{Bot, PublishRequest};
use crate::broker::queue::{PublishQueue, QueuedRequest};
use crate::broker::registry::SubscriptionRegistry;
use crate::broker::stats::ServiceTimes;
use crate::client::BotClient;
use crate::config::Settings;
use crate::persistence::Persistence;
use crate::utils::BrokerError;

/// What happened to the deliveries of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub targets: usize,
    pub acknowledged: usize,
    pub deferred: usize,
    pub cancelled: usize,
}

impl PublishReport {
    fn tally(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Acknowledged => self.acknowledged += 1,
            DeliveryOutcome::Deferred | DeliveryOutcome::Abandoned => self.deferred += 1,
            DeliveryOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug)]
pub struct Broker {
    registry: SubscriptionRegistry,
    resilience: ResilienceLog,
    pending: PendingLog,
    queue: PublishQueue,
    worker: DeliveryWorker,
    service_times: ServiceTimes,
    topics: Vec<String>,
    shutdown: CancellationToken,
}

impl Broker {
    /// Builds a broker over `store`. Nothing is restored or recovered yet;
    /// see `SubscriptionRegistry::restore` and `Broker::recover`.
    pub fn new(
        settings: &Settings,
        store: Persistence,
        shutdown: CancellationToken,
    ) -> Result<Self, BrokerError> {
        let resilience = ResilienceLog::new(store.clone());
        let client = BotClient::new(
            settings.delivery.bot_port,
            settings.delivery.request_timeout(),
        )?;
        let worker = DeliveryWorker::new(
            client,
            resilience.clone(),
            settings.delivery.retry_policy(),
            shutdown.clone(),
        );

        Ok(Self {
            registry: SubscriptionRegistry::new(settings.broker.context_aware, store.clone()),
            resilience,
            pending: PendingLog::new(store),
            queue: PublishQueue::new(),
            worker,
            service_times: ServiceTimes::default(),
            topics: settings.broker.topics.clone(),
            shutdown,
        })
    }

    /// The subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// The log of unacknowledged deliveries.
    pub fn resilience(&self) -> &ResilienceLog {
        &self.resilience
    }

    /// The log of accepted, not yet retired requests.
    pub fn pending(&self) -> &PendingLog {
        &self.pending
    }

    /// The intake queue between `accept` and the intake loop.
    pub fn queue(&self) -> &PublishQueue {
        &self.queue
    }

    /// Service times collected for `/stats`.
    pub fn service_times(&self) -> &ServiceTimes {
        &self.service_times
    }

    pub fn is_context_aware(&self) -> bool {
        self.registry.is_context_aware()
    }

    /// Whether `topic` is one of the configured topics.
    pub fn is_known_topic(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    fn check_topic(&self, topic: &str) -> Result<(), BrokerError> {
        if self.is_known_topic(topic) {
            Ok(())
        } else {
            Err(BrokerError::UnknownTopic(topic.to_string()))
        }
    }

    /// Registers and subscribes a bot, generating its id if missing.
    pub fn register_bot(&self, mut bot: Bot) -> Result<Bot, BrokerError> {
        self.check_topic(&bot.topic)?;
        bot.ensure_id();
        let bot = self.registry.register(bot)?;
        info!(bot_id = %bot.id, topic = %bot.topic, sector = %bot.sector, "bot registered");
        Ok(bot)
    }

    /// Removes one subscription of `bot` and its durable record.
    pub fn unsubscribe_bot(&self, bot: &Bot) -> Result<(), BrokerError> {
        self.registry.unsubscribe(bot)
    }

    /// Accepts a sensor request: persisted to the pending log, then queued.
    /// Retransmissions are acknowledged without being stored or queued.
    pub fn accept(&self, mut request: PublishRequest) -> Result<PublishRequest, BrokerError> {
        self.check_topic(&request.topic)?;
        request.ensure_id();

        if request.is_retransmission {
            debug!(sensor_id = %request.id, "retransmission acknowledged without publishing");
            return Ok(request);
        }

        self.pending.accept(&request)?;
        self.queue.push(request.clone());
        debug!(sensor_id = %request.id, queued = self.queue.len(), "sensor request accepted");
        Ok(request)
    }

    /// Publishes one request to every bot subscribed at this moment.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishReport, BrokerError> {
        let bots = self.registry.snapshot_for(&request.topic, &request.sector);

        let report = if bots.is_empty() {
            debug!(sensor_id = %request.id, topic = %request.topic, "no subscribers");
            PublishReport::default()
        } else {
            self.resilience.record(&bots, request)?;
            self.fan_out(bots, request).await?
        };

        self.retire(request, &report)?;
        Ok(report)
    }

    /// Deletes the pending entry once every delivery resolved. A request
    /// interrupted by shutdown stays pending for the next recovery pass.
    pub(crate) fn retire(
        &self,
        request: &PublishRequest,
        report: &PublishReport,
    ) -> Result<(), BrokerError> {
        if report.cancelled > 0 {
            info!(
                sensor_id = %request.id,
                cancelled = report.cancelled,
                "publish interrupted by shutdown, request left pending"
            );
            return Ok(());
        }

        self.pending.retire(request)?;
        info!(
            sensor_id = %request.id,
            targets = report.targets,
            acknowledged = report.acknowledged,
            deferred = report.deferred,
            "publish request retired"
        );
        Ok(())
    }

    /// Runs one delivery per bot concurrently and waits for all of them.
    /// The resilience entries must already be recorded.
    pub(crate) async fn fan_out(
        &self,
        bots: Vec<Bot>,
        request: &PublishRequest,
    ) -> Result<PublishReport, BrokerError> {
        let mut report = PublishReport {
            targets: bots.len(),
            ..PublishReport::default()
        };

        let mut deliveries = JoinSet::new();
        for bot in bots {
            let worker = self.worker.clone();
            let request = request.clone();
            deliveries.spawn(async move { worker.deliver(bot, request).await });
        }

        while let Some(joined) = deliveries.join_next().await {
            report.tally(joined??);
        }
        Ok(report)
    }

    async fn publish_queued(&self, queued: QueuedRequest) -> Result<PublishReport, BrokerError> {
        let report = self.publish(&queued.request).await?;
        self.service_times.record(queued.accepted_at.elapsed());
        Ok(report)
    }

    /// Drains the intake queue until shutdown. Each request is published on
    /// its own task; the first fatal error from any of them ends the loop.
    pub async fn run_intake(self: Arc<Self>) -> Result<(), BrokerError> {
        let mut in_flight = JoinSet::new();
        info!("intake loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(in_flight = in_flight.len(), "intake loop stopping");
                    return Ok(());
                }
                queued = self.queue.pop() => {
                    let broker = Arc::clone(&self);
                    in_flight.spawn(async move { broker.publish_queued(queued).await });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined? {
                        error!(error = %e, "publish failed");
                        return Err(e);
                    }
                }
            }
        }
    }
}
