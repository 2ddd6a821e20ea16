//! Delivery Tracker: per-alert target-set vs delivered-set accounting.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub target_users: HashSet<Uuid>,
    pub delivered_users: HashSet<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeliveryStatus {
    pub target_users: HashSet<Uuid>,
    pub delivered_users: HashSet<Uuid>,
    pub pending: usize,
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}

pub struct DeliveryTracker {
    records: DashMap<Uuid, DeliveryRecord>,
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn track(&self, alert_id: Uuid, targets: HashSet<Uuid>) {
        self.records.insert(
            alert_id,
            DeliveryRecord {
                target_users: targets,
                delivered_users: HashSet::new(),
                created_at: Utc::now(),
            },
        );
    }

    /// Adds `user_id` to delivered only if it is a tracked target.
    pub fn confirm(&self, alert_id: Uuid, user_id: Uuid) {
        if let Some(mut record) = self.records.get_mut(&alert_id) {
            if record.target_users.contains(&user_id) {
                record.delivered_users.insert(user_id);
            }
        }
    }

    pub fn status(&self, alert_id: Uuid) -> Option<DeliveryStatus> {
        let record = self.records.get(&alert_id)?;
        let target_count = record.target_users.len();
        let delivered_count = record.delivered_users.len();
        let rate = if target_count == 0 {
            0.0
        } else {
            delivered_count as f64 / target_count as f64
        };
        Some(DeliveryStatus {
            target_users: record.target_users.clone(),
            delivered_users: record.delivered_users.clone(),
            pending: target_count.saturating_sub(delivered_count),
            rate,
            created_at: record.created_at,
        })
    }

    pub fn gc(&self, max_age: Duration) {
        let now = Utc::now();
        self.records.retain(|_, record| now - record.created_at <= max_age);
    }
}
