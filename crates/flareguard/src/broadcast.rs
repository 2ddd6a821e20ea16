//! Broadcast Engine: the central coordinator orchestrating C, D, E, F against A.

use crate::delivery::DeliveryTracker;
use crate::proto::{Alert, Prediction, ServerMessage, Severity, Thresholds};
use crate::queue::OfflineQueue;
use crate::registry::ConnectionRegistry;
use crate::threshold::{evaluate, should_fire, EvaluatedPrediction};
use crate::webhook::{WebhookDispatcher, WebhookReport};
use crate::ports::{PredictionsRepository, SubscriptionsRepository};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Outcome of a single `process_prediction` call. Never an `Err` — every
/// substep is a caught, logged, and summarized error boundary.
#[derive(Debug, Clone)]
pub enum BroadcastResult {
    NotFired {
        reason: String,
    },
    Fired {
        alert_id: Uuid,
        severity: Severity,
        connections_attempted: usize,
        webhook_report: WebhookReportSummary,
    },
}

#[derive(Debug, Clone)]
pub struct WebhookReportSummary {
    pub ok_count: usize,
    pub failed_count: usize,
}

impl From<&WebhookReport> for WebhookReportSummary {
    fn from(report: &WebhookReport) -> Self {
        Self {
            ok_count: report.ok_count,
            failed_count: report.failed_count,
        }
    }
}

pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    offline_queue: Arc<OfflineQueue>,
    delivery_tracker: Arc<DeliveryTracker>,
    webhook_dispatcher: Arc<WebhookDispatcher>,
    subscriptions: Arc<dyn SubscriptionsRepository>,
    predictions_repo: Arc<dyn PredictionsRepository>,
    default_thresholds: Thresholds,
    realert_window: chrono::Duration,
    last_prediction: Mutex<Option<EvaluatedPredictionOwned>>,
}

/// Owned copy of the last fired prediction, since `EvaluatedPrediction`
/// borrows. Held only long enough to compare against the next one.
#[derive(Clone)]
struct EvaluatedPredictionOwned {
    prediction: Prediction,
    severity: Severity,
}

impl BroadcastEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        offline_queue: Arc<OfflineQueue>,
        delivery_tracker: Arc<DeliveryTracker>,
        webhook_dispatcher: Arc<WebhookDispatcher>,
        subscriptions: Arc<dyn SubscriptionsRepository>,
        predictions_repo: Arc<dyn PredictionsRepository>,
        default_thresholds: Thresholds,
        realert_window: chrono::Duration,
    ) -> Self {
        Self {
            registry,
            offline_queue,
            delivery_tracker,
            webhook_dispatcher,
            subscriptions,
            predictions_repo,
            default_thresholds,
            realert_window,
            last_prediction: Mutex::new(None),
        }
    }

    pub async fn process_prediction(&self, prediction: Prediction) -> BroadcastResult {
        let Some(severity) = evaluate(prediction.probability, &self.default_thresholds) else {
            return BroadcastResult::NotFired {
                reason: "below_low_threshold".to_string(),
            };
        };

        let current = EvaluatedPrediction {
            prediction: &prediction,
            severity,
        };

        let mut last = self.last_prediction.lock().await;
        let previous_ref = last.as_ref().map(|p| EvaluatedPrediction {
            prediction: &p.prediction,
            severity: p.severity,
        });

        if !should_fire(&current, previous_ref.as_ref(), self.realert_window) {
            return BroadcastResult::NotFired {
                reason: "threshold_not_met_or_suppressed".to_string(),
            };
        }

        let alert = Alert::new(&prediction, severity);

        let connections_attempted = self.fan_out_to_connections(&alert, severity).await;
        let webhook_report = self.fan_out_to_webhooks(&alert, severity).await;

        self.record_delivery(&alert, &connections_attempted, &webhook_report);

        if let Err(e) = self.predictions_repo.append_alert(&alert).await {
            warn!(alert_id = %alert.alert_id, error = %e, "failed to persist alert history");
        }

        *last = Some(EvaluatedPredictionOwned {
            prediction,
            severity,
        });

        BroadcastResult::Fired {
            alert_id: alert.alert_id,
            severity,
            connections_attempted: connections_attempted.count,
            webhook_report: WebhookReportSummary::from(&webhook_report),
        }
    }

    async fn fan_out_to_connections(&self, alert: &Alert, severity: Severity) -> ConnectionFanOutResult {
        let snapshot = self.registry.all();
        let message = ServerMessage::alert(alert).into_frame();

        let mut attempted = 0usize;
        let mut targeted = HashSet::new();
        let mut delivered_to = HashSet::new();

        for conn in snapshot {
            let eligible = match conn.tier {
                crate::proto::Tier::Free => severity == Severity::High && alert.probability >= conn.thresholds.high,
                crate::proto::Tier::Pro | crate::proto::Tier::Enterprise => {
                    alert.probability >= conn.thresholds.get(severity)
                }
            };
            if !eligible {
                continue;
            }

            attempted += 1;
            if let Some(user_id) = conn.user_id {
                targeted.insert(user_id);
            }

            if conn.tx.send(message.clone()).await.is_err() {
                warn!(connection_id = %conn.connection_id, "send failed during broadcast, removing connection");
                if let Some(user_id) = conn.user_id {
                    self.enqueue_offline(user_id, alert.clone()).await;
                }
                self.registry.remove(conn.connection_id);
            } else if let Some(user_id) = conn.user_id {
                delivered_to.insert(user_id);
            }
        }

        ConnectionFanOutResult {
            count: attempted,
            targeted,
            delivered_to,
        }
    }

    async fn fan_out_to_webhooks(&self, alert: &Alert, _severity: Severity) -> WebhookReport {
        let subscriptions = self.subscriptions.list_users_with_webhooks().await;
        self.webhook_dispatcher.dispatch(alert, &subscriptions).await
    }

    /// `targets` is everyone we attempted delivery to (connections plus
    /// webhook subscribers); only the subset that actually succeeded is
    /// confirmed, preserving `delivered_users ⊆ target_users`.
    fn record_delivery(&self, alert: &Alert, connections: &ConnectionFanOutResult, webhook_report: &WebhookReport) {
        let mut targets = connections.targeted.clone();
        targets.extend(webhook_report.results.iter().map(|r| r.user_id));
        self.delivery_tracker.track(alert.alert_id, targets);

        for user_id in &connections.delivered_to {
            self.delivery_tracker.confirm(alert.alert_id, *user_id);
        }
        for result in &webhook_report.results {
            if result.status == crate::webhook::WebhookStatus::Ok {
                self.delivery_tracker.confirm(alert.alert_id, result.user_id);
            }
        }
    }

    /// Enqueues an alert for a user with no live connection, so it can be
    /// drained later by `flush_user_queue`.
    pub async fn enqueue_offline(&self, user_id: Uuid, alert: Alert) {
        self.offline_queue.enqueue(user_id, alert).await;
    }

    /// On reconnect: drain the offline queue and send every message to all
    /// of the user's current connections, in enqueue order.
    pub async fn flush_user_queue(&self, user_id: Uuid) {
        let queued = self.offline_queue.drain(user_id).await;
        if queued.is_empty() {
            return;
        }

        let connections = self.registry.by_user(user_id);
        for message in queued {
            let frame = ServerMessage::alert(&message.alert).into_frame();
            for conn in &connections {
                if conn.tx.send(frame.clone()).await.is_err() {
                    warn!(connection_id = %conn.connection_id, "send failed during queue flush");
                    self.registry.remove(conn.connection_id);
                }
            }
        }
    }

    /// Scheduled every 60 minutes: delivery-tracker and offline-queue GC.
    pub async fn periodic_cleanup(&self, delivery_ttl: chrono::Duration, queue_ttl: chrono::Duration) {
        self.delivery_tracker.gc(delivery_ttl);
        self.offline_queue.gc(queue_ttl).await;
    }
}

struct ConnectionFanOutResult {
    count: usize,
    targeted: HashSet<Uuid>,
    delivered_to: HashSet<Uuid>,
}
