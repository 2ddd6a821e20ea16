//! In-process reference adapters. Not a spec requirement on their own, but
//! every external interface needs *some* concrete implementation to run the
//! server and drive integration tests.

use super::{PredictionsRepository, SubscriptionsRepository, TokenValidator};
use crate::proto::{Alert, Tier, WebhookSubscription};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Static token -> (user_id, tier) map, populated by the operator ahead of
/// time. No expiry, no refresh; a stand-in for the real auth service.
#[derive(Default)]
pub struct StaticTokenValidator {
    tokens: DashMap<String, (Uuid, Tier)>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, user_id: Uuid, tier: Tier) {
        self.tokens.insert(token.into(), (user_id, tier));
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Option<(Uuid, Tier)> {
        self.tokens.get(token).map(|e| *e)
    }
}

/// In-memory webhook subscription store.
#[derive(Default)]
pub struct InMemorySubscriptions {
    subscriptions: DashMap<Uuid, WebhookSubscription>,
}

impl InMemorySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscription: WebhookSubscription) {
        self.subscriptions.insert(subscription.user_id, subscription);
    }
}

#[async_trait]
impl SubscriptionsRepository for InMemorySubscriptions {
    async fn list_users_with_webhooks(&self) -> Vec<WebhookSubscription> {
        self.subscriptions.iter().map(|e| e.clone()).collect()
    }
}

/// In-memory alert history, retained for the process lifetime only.
#[derive(Default)]
pub struct InMemoryPredictionsRepository {
    history: Mutex<Vec<Alert>>,
}

impl InMemoryPredictionsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Alert> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionsRepository for InMemoryPredictionsRepository {
    async fn append_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        self.history.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Severity;

    #[tokio::test]
    async fn test_static_token_validator() {
        let validator = StaticTokenValidator::new();
        let user_id = Uuid::new_v4();
        validator.insert("tok-123", user_id, Tier::Pro);

        assert_eq!(validator.validate("tok-123").await, Some((user_id, Tier::Pro)));
        assert_eq!(validator.validate("nope").await, None);
    }

    #[tokio::test]
    async fn test_in_memory_subscriptions() {
        let repo = InMemorySubscriptions::new();
        let sub = WebhookSubscription {
            user_id: Uuid::new_v4(),
            tier: Tier::Enterprise,
            webhook_url: "https://example.com/hook".to_string(),
            thresholds: None,
        };
        repo.insert(sub.clone());

        let all = repo.list_users_with_webhooks().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user_id, sub.user_id);
    }

    #[tokio::test]
    async fn test_in_memory_predictions_repository_appends() {
        let repo = InMemoryPredictionsRepository::new();
        let prediction = crate::proto::Prediction {
            prediction_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            probability: 0.9,
            model_version: "v1".to_string(),
            confidence: 0.8,
            raw_output: None,
        };
        let alert = Alert::new(&prediction, Severity::High);
        repo.append_alert(&alert).await.unwrap();

        assert_eq!(repo.history().len(), 1);
    }
}
