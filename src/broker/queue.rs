//! Publish request intake queue
//!
//! FIFO buffer between the HTTP handler that accepts a request and the intake
//! loop that hands it to the coordinator. The queue is not durable; after a
//! crash its contents come back from the pending request log.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::Notify;

use crate::broker::message::PublishRequest;

#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: PublishRequest,
    pub accepted_at: Instant,
}

#[derive(Debug, Default)]
pub struct PublishQueue {
    items: Mutex<VecDeque<QueuedRequest>>,
    ready: Notify,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request` and wakes one waiting `pop`.
    pub fn push(&self, request: PublishRequest) {
        self.lock().push_back(QueuedRequest {
            request,
            accepted_at: Instant::now(),
        });
        self.ready.notify_one();
    }

    /// Removes the oldest request, if any, without waiting.
    pub fn try_pop(&self) -> Option<QueuedRequest> {
        self.lock().pop_front()
    }

    /// Waits until a request is available and removes it.
    pub async fn pop(&self) -> QueuedRequest {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.ready.notified().await;
        }
    }

    /// Requests waiting to be published.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedRequest>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
