//! Write-ahead logs
//!
//! Two durable logs make publishing crash-safe:
//! - the pending request log holds every accepted request until all of its
//!   deliveries are resolved;
//! - the resilience log holds one entry per (bot, request) obligation, written
//!   before the first delivery attempt and deleted on acknowledgment.
//!
//! Recovery rebuilds in-flight work from these two logs alone.

use tracing::debug;

use crate::broker::message::{Bot, PublishRequest, ResilienceEntry, ResilienceKey};
use crate::persistence::{Persistence, Record};
use crate::utils::StoreError;

#[derive(Debug, Clone)]
pub struct ResilienceLog {
    store: Persistence,
}

impl ResilienceLog {
    pub fn new(store: Persistence) -> Self {
        Self { store }
    }

    /// Writes one entry per bot. Every entry is durable when this returns.
    pub fn record(&self, bots: &[Bot], request: &PublishRequest) -> Result<(), StoreError> {
        for bot in bots {
            self.store.put(&ResilienceEntry::new(bot, request))?;
        }
        debug!(sensor_id = %request.id, entries = bots.len(), "resilience entries written");
        Ok(())
    }

    /// Deletes the entry for `key` once its bot acknowledged. Resolving a
    /// missing entry is a no-op.
    pub fn resolve(&self, key: &ResilienceKey) -> Result<(), StoreError> {
        self.store.delete::<ResilienceEntry>(key)?;
        debug!(bot_id = %key.bot_id, sensor_id = %key.sensor_id, "resilience entry resolved");
        Ok(())
    }

    #[cfg(test)]
    pub fn contains(&self, key: &ResilienceKey) -> Result<bool, StoreError> {
        Ok(self.store.get::<ResilienceEntry>(key)?.is_some())
    }

    /// Every outstanding obligation, in key order.
    pub fn load(&self) -> Result<Vec<ResilienceEntry>, StoreError> {
        self.store.scan()
    }
}

#[derive(Debug, Clone)]
pub struct PendingLog {
    store: Persistence,
}

impl PendingLog {
    pub fn new(store: Persistence) -> Self {
        Self { store }
    }

    /// Records `request` as accepted. Must happen before it is queued.
    pub fn accept(&self, request: &PublishRequest) -> Result<(), StoreError> {
        self.store.put(request)
    }

    /// Deletes the pending entry. Retiring twice is harmless.
    pub fn retire(&self, request: &PublishRequest) -> Result<(), StoreError> {
        self.store.delete::<PublishRequest>(&request.key())?;
        debug!(sensor_id = %request.id, "pending request retired");
        Ok(())
    }

    #[cfg(test)]
    pub fn contains(&self, request: &PublishRequest) -> Result<bool, StoreError> {
        Ok(self
            .store
            .get::<PublishRequest>(&request.key())?
            .is_some())
    }

    /// Every request accepted but not yet retired.
    pub fn load(&self) -> Result<Vec<PublishRequest>, StoreError> {
        self.store.scan()
    }
}
