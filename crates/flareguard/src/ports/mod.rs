//! External interface adapters: the capabilities the core consumes but does
//! not own the implementation of.

pub mod inmemory;

use crate::proto::{Alert, Tier, WebhookSubscription};
use async_trait::async_trait;
use uuid::Uuid;

/// Validates an opaque bearer token handed in at handshake or via the
/// `authenticate` control message. Side-effect-free from the core's view.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Option<(Uuid, Tier)>;
}

/// Read-side of the webhook subscription store.
#[async_trait]
pub trait SubscriptionsRepository: Send + Sync {
    async fn list_users_with_webhooks(&self) -> Vec<WebhookSubscription>;
}

/// Best-effort alert history sink. A failure here must never block the
/// broadcast it originated from.
#[async_trait]
pub trait PredictionsRepository: Send + Sync {
    async fn append_alert(&self, alert: &Alert) -> anyhow::Result<()>;
}
