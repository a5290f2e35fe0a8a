//! The `server` module wires the broker into a running process.
//!
//! [`start`] brings the pieces up in a fixed order:
//! 1. bots are restored from the store;
//! 2. the write-ahead logs are replayed into a recovery plan, which fails
//!    startup on an orphaned entry;
//! 3. the HTTP listener is bound and served;
//! 4. the intake loop starts draining the queue.
//!
//! Recovered deliveries run in the background from step 2 on.
//! [`Server::wait`] then blocks until shutdown or the first fatal error.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::config::Settings;
use crate::persistence::Persistence;
use crate::transport::{AppState, router, start_http_server};
use crate::utils::BrokerError;

type Task = JoinHandle<Result<(), BrokerError>>;

/// A started broker process.
pub struct Server {
    broker: Arc<Broker>,
    local_addr: SocketAddr,
    recovery: Task,
    http: Task,
    intake: Task,
    fatal: UnboundedReceiver<BrokerError>,
    shutdown: CancellationToken,
}

/// Restores, recovers, binds and starts serving. Cancelling `shutdown` stops
/// every task that was started.
pub async fn start(
    settings: &Settings,
    store: Persistence,
    shutdown: CancellationToken,
) -> Result<Server, BrokerError> {
    let broker = Arc::new(Broker::new(settings, store, shutdown.clone())?);
    info!(
        context_aware = settings.broker.context_aware,
        topics = ?settings.broker.topics,
        "broker starting"
    );

    // bots first: recovery resolves entries against the restored roster
    broker.registry().restore()?;
    let recovery = broker.recover()?;

    let (fatal_tx, fatal) = mpsc::unbounded_channel();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    let http = tokio::spawn(start_http_server(
        listener,
        router(AppState::new(broker.clone(), fatal_tx)),
        shutdown.clone(),
    ));
    let intake = tokio::spawn(broker.clone().run_intake());

    Ok(Server {
        broker,
        local_addr,
        recovery,
        http,
        intake,
        fatal,
        shutdown,
    })
}

impl Server {
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// The address the HTTP surface is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs until shutdown is requested or a task fails. A failed task, a
    /// failed recovery and a fatal handler error all end up here as `Err`.
    /// Every task is told to stop before this returns.
    pub async fn wait(mut self) -> Result<(), BrokerError> {
        let result = tokio::select! {
            joined = &mut self.intake => flatten(joined),
            joined = &mut self.http => flatten(joined),
            result = watch_recovery(&mut self.recovery) => result,
            Some(e) = self.fatal.recv() => Err(e),
            _ = self.shutdown.cancelled() => Ok(()),
        };

        self.shutdown.cancel();
        result
    }
}

/// Resolves only if recovery fails; a successful recovery leaves the server
/// running.
async fn watch_recovery(recovery: &mut Task) -> Result<(), BrokerError> {
    flatten(recovery.await)?;
    std::future::pending().await
}

fn flatten(joined: Result<Result<(), BrokerError>, JoinError>) -> Result<(), BrokerError> {
    joined?
}

#[cfg(test)]
mod tests;
