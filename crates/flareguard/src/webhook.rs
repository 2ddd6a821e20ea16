//! Webhook Dispatcher: tier/severity filtering plus bounded-concurrency POST fan-out.

use crate::proto::{Alert, Severity, Tier, WebhookSubscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-user outcome of a webhook send attempt.
#[derive(Debug, Clone)]
pub struct WebhookResult {
    pub user_id: Uuid,
    pub url: String,
    pub status: WebhookStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookStatus {
    Ok,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WebhookReport {
    pub results: Vec<WebhookResult>,
    pub ok_count: usize,
    pub failed_count: usize,
}

/// FREE never receives webhooks; PRO only on HIGH; ENTERPRISE always.
pub fn is_eligible(tier: Tier, severity: Severity) -> bool {
    match tier {
        Tier::Free => false,
        Tier::Pro => severity == Severity::High,
        Tier::Enterprise => true,
    }
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl WebhookDispatcher {
    pub fn new(timeout: Duration, max_concurrent: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build webhook http client");

        Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Filters `subscriptions` by tier x severity, then fans the surviving
    /// sends out under the dispatcher's concurrency cap. Best-effort: a
    /// failed or timed-out send is recorded, never propagated.
    pub async fn dispatch(&self, alert: &Alert, subscriptions: &[WebhookSubscription]) -> WebhookReport {
        let eligible: Vec<_> = subscriptions
            .iter()
            .filter(|s| is_eligible(s.tier, alert.severity))
            .collect();

        let payload = crate::proto::webhook_payload(alert);
        let mut handles = Vec::with_capacity(eligible.len());

        for subscription in eligible {
            let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore closed");
            let client = self.client.clone();
            let url = subscription.webhook_url.clone();
            let user_id = subscription.user_id;
            let body = serde_json::to_value(&payload).expect("alert payload always serializes");

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .json(&body)
                    .send()
                    .await;

                let status = match outcome {
                    Ok(response) if response.status().is_success() => WebhookStatus::Ok,
                    Ok(response) => WebhookStatus::Failed(format!("status {}", response.status())),
                    Err(e) if e.is_timeout() => WebhookStatus::Failed("timeout".to_string()),
                    Err(e) => WebhookStatus::Failed(e.to_string()),
                };

                if let WebhookStatus::Failed(ref reason) = status {
                    warn!(user_id = %user_id, url = %url, reason, "webhook send failed");
                } else {
                    debug!(user_id = %user_id, url = %url, "webhook delivered");
                }

                WebhookResult { user_id, url, status }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "webhook send task panicked"),
            }
        }

        let ok_count = results.iter().filter(|r| r.status == WebhookStatus::Ok).count();
        let failed_count = results.len() - ok_count;

        WebhookReport {
            results,
            ok_count,
            failed_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_eligibility_policy() {
        assert!(!is_eligible(Tier::Free, Severity::High));
        assert!(!is_eligible(Tier::Pro, Severity::Medium));
        assert!(is_eligible(Tier::Pro, Severity::High));
        assert!(is_eligible(Tier::Enterprise, Severity::Low));
        assert!(is_eligible(Tier::Enterprise, Severity::High));
    }

    #[tokio::test]
    async fn test_dispatch_skips_ineligible_users() {
        let dispatcher = WebhookDispatcher::new(Duration::from_secs(10), 4);
        let prediction = crate::proto::Prediction {
            prediction_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            probability: 0.65,
            model_version: "v1".to_string(),
            confidence: 0.9,
            raw_output: None,
        };
        let alert = Alert::new(&prediction, Severity::Medium);

        let subscriptions = vec![
            WebhookSubscription {
                user_id: Uuid::new_v4(),
                tier: Tier::Free,
                webhook_url: "https://example.invalid/free".to_string(),
                thresholds: None,
            },
            WebhookSubscription {
                user_id: Uuid::new_v4(),
                tier: Tier::Pro,
                webhook_url: "https://example.invalid/pro".to_string(),
                thresholds: None,
            },
        ];

        let report = dispatcher.dispatch(&alert, &subscriptions).await;
        // MEDIUM severity: neither FREE nor PRO is eligible, so nothing sent.
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sends_only_to_enterprise_at_medium_severity() {
        let free_server = MockServer::start().await;
        let pro_server = MockServer::start().await;
        let enterprise_server = MockServer::start().await;

        for server in [&free_server, &pro_server, &enterprise_server] {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .mount(server)
                .await;
        }

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(10), 32);
        let prediction = crate::proto::Prediction {
            prediction_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            probability: 0.65,
            model_version: "v1".to_string(),
            confidence: 0.9,
            raw_output: None,
        };
        let alert = Alert::new(&prediction, Severity::Medium);

        let subscriptions = vec![
            WebhookSubscription {
                user_id: Uuid::new_v4(),
                tier: Tier::Free,
                webhook_url: free_server.uri(),
                thresholds: None,
            },
            WebhookSubscription {
                user_id: Uuid::new_v4(),
                tier: Tier::Pro,
                webhook_url: pro_server.uri(),
                thresholds: None,
            },
            WebhookSubscription {
                user_id: Uuid::new_v4(),
                tier: Tier::Enterprise,
                webhook_url: enterprise_server.uri(),
                thresholds: None,
            },
        ];

        let report = dispatcher.dispatch(&alert, &subscriptions).await;

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.ok_count, 1);
        assert_eq!(report.results[0].url, enterprise_server.uri());
    }

    #[tokio::test]
    async fn test_dispatch_records_non_2xx_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(10), 32);
        let prediction = crate::proto::Prediction {
            prediction_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            probability: 0.95,
            model_version: "v1".to_string(),
            confidence: 0.9,
            raw_output: None,
        };
        let alert = Alert::new(&prediction, Severity::High);

        let subscriptions = vec![WebhookSubscription {
            user_id: Uuid::new_v4(),
            tier: Tier::Enterprise,
            webhook_url: server.uri(),
            thresholds: None,
        }];

        let report = dispatcher.dispatch(&alert, &subscriptions).await;
        assert_eq!(report.failed_count, 1);
        assert!(matches!(report.results[0].status, WebhookStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_dispatch_records_timeout_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(Duration::from_millis(20), 4);
        let prediction = crate::proto::Prediction {
            prediction_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            probability: 0.95,
            model_version: "v1".to_string(),
            confidence: 0.9,
            raw_output: None,
        };
        let alert = Alert::new(&prediction, Severity::High);

        let subscriptions = vec![WebhookSubscription {
            user_id: Uuid::new_v4(),
            tier: Tier::Enterprise,
            webhook_url: server.uri(),
            thresholds: None,
        }];

        let report = dispatcher.dispatch(&alert, &subscriptions).await;
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.results[0].status, WebhookStatus::Failed("timeout".to_string()));
    }
}
