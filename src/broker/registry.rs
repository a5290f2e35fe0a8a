//! Subscription registry
//!
//! Maps a [`SubscriptionKey`] to the ordered list of bots subscribed under it
//! and keeps the roster of every known bot. Subscriptions are a `Vec`, not a
//! set: a bot that subscribes twice is delivered to twice.
//!
//! All state sits behind one reader/writer lock. The lock is only held for a
//! mutation or a copy-out, never across store or network I/O.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::broker::message::Bot;
use crate::persistence::Persistence;
use crate::utils::BrokerError;

/// What subscriptions are grouped by: the topic alone, or the topic and the
/// sector in context-aware mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    Topic(String),
    TopicSector(String, String),
}

impl SubscriptionKey {
    pub fn resolve(context_aware: bool, topic: &str, sector: &str) -> Self {
        if context_aware {
            SubscriptionKey::TopicSector(topic.to_string(), sector.to_string())
        } else {
            SubscriptionKey::Topic(topic.to_string())
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    subscribers: HashMap<SubscriptionKey, Vec<Bot>>,
    roster: Vec<Bot>,
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    context_aware: bool,
    state: RwLock<RegistryState>,
    store: Persistence,
}

impl SubscriptionRegistry {
    pub fn new(context_aware: bool, store: Persistence) -> Self {
        Self {
            context_aware,
            state: RwLock::new(RegistryState::default()),
            store,
        }
    }

    pub fn is_context_aware(&self) -> bool {
        self.context_aware
    }

    /// The key `(topic, sector)` resolves to in this registry's mode.
    pub fn key_for(&self, topic: &str, sector: &str) -> SubscriptionKey {
        SubscriptionKey::resolve(self.context_aware, topic, sector)
    }

    /// Persists `bot` and subscribes it.
    pub fn register(&self, bot: Bot) -> Result<Bot, BrokerError> {
        self.store.put(&bot)?;
        self.subscribe(bot.clone());
        Ok(bot)
    }

    /// Re-subscribes every bot found in the durable bot table.
    pub fn restore(&self) -> Result<usize, BrokerError> {
        let bots = self.store.scan::<Bot>()?;
        let count = bots.len();
        for bot in bots {
            self.subscribe(bot);
        }
        info!(count, "restored bot subscriptions from store");
        Ok(count)
    }

    /// Appends `bot` to the collection for its key. No uniqueness check.
    pub fn subscribe(&self, bot: Bot) {
        let key = self.key_for(&bot.topic, &bot.sector);
        debug!(bot_id = %bot.id, ?key, "subscribing bot");

        let mut state = self.write();
        state.roster.push(bot.clone());
        state.subscribers.entry(key).or_default().push(bot);
    }

    /// Removes the first subscription of `bot` under its current topic/sector,
    /// drops it from the roster and deletes its durable record.
    pub fn unsubscribe(&self, bot: &Bot) -> Result<(), BrokerError> {
        let key = self.key_for(&bot.topic, &bot.sector);
        {
            let mut state = self.write();
            if let Some(bots) = state.subscribers.get_mut(&key) {
                if let Some(pos) = bots.iter().position(|b| b.id == bot.id) {
                    bots.remove(pos);
                }
            }
            state.roster.retain(|b| b.id != bot.id);
        }

        self.store.delete::<Bot>(&bot.id)?;
        info!(bot_id = %bot.id, "bot unsubscribed and removed");
        Ok(())
    }

    /// Copy of the subscribers for `(topic, sector)`; `sector` is ignored in
    /// flat mode.
    pub fn snapshot_for(&self, topic: &str, sector: &str) -> Vec<Bot> {
        let key = self.key_for(topic, sector);
        self.read()
            .subscribers
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Looks a bot up in the roster by id.
    pub fn find_bot(&self, id: &str) -> Option<Bot> {
        self.read().roster.iter().find(|b| b.id == id).cloned()
    }

    /// Number of bots in the roster, duplicates included.
    pub fn bot_count(&self) -> usize {
        self.read().roster.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
