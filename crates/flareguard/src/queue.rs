//! Offline Queue: bounded per-user FIFO of undelivered alerts.

use crate::proto::Alert;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An alert plus the time it was enqueued.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub alert: Alert,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-user bounded FIFO, capacity `N`. Overflow drops the oldest message,
/// mirroring the ring-buffer eviction used for the event buffer elsewhere
/// in this service.
pub struct OfflineQueue {
    capacity: usize,
    queues: DashMap<Uuid, Mutex<VecDeque<QueuedMessage>>>,
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: DashMap::new(),
        }
    }

    pub async fn enqueue(&self, user_id: Uuid, alert: Alert) {
        let queue = self.queues.entry(user_id).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = queue.lock().await;
        queue.push_back(QueuedMessage {
            alert,
            enqueued_at: Utc::now(),
        });
        if queue.len() > self.capacity {
            queue.pop_front();
        }
    }

    /// Atomically returns and clears the user's queue.
    pub async fn drain(&self, user_id: Uuid) -> Vec<QueuedMessage> {
        let Some(queue) = self.queues.get(&user_id) else {
            return Vec::new();
        };
        let mut queue = queue.lock().await;
        queue.drain(..).collect()
    }

    pub async fn size(&self, user_id: Uuid) -> usize {
        match self.queues.get(&user_id) {
            Some(queue) => queue.lock().await.len(),
            None => 0,
        }
    }

    /// Drops messages older than `max_age`; drops empty user entries.
    pub async fn gc(&self, max_age: Duration) {
        let now = Utc::now();
        let mut emptied = Vec::new();

        for entry in self.queues.iter() {
            let mut queue = entry.value().lock().await;
            queue.retain(|m| now - m.enqueued_at <= max_age);
            if queue.is_empty() {
                emptied.push(*entry.key());
            }
        }

        for user_id in emptied {
            self.queues.remove(&user_id);
        }
    }
}
