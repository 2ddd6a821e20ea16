//! Wire types for the push protocol and the core's data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Pro,
    Enterprise,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Per-connection severity gate, `LOW <= MEDIUM <= HIGH` in [0,1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Thresholds {
    pub fn get(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }

    /// `LOW <= MEDIUM <= HIGH`, each in `[0,1]`.
    pub fn is_monotonic(&self) -> bool {
        let in_range = |p: f64| (0.0..=1.0).contains(&p);
        in_range(self.low)
            && in_range(self.medium)
            && in_range(self.high)
            && self.low <= self.medium
            && self.medium <= self.high
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.6,
            high: 0.8,
        }
    }
}

/// A model prediction fed into the broadcast engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub prediction_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
    pub model_version: String,
    pub confidence: f64,
    #[serde(default)]
    pub raw_output: Option<serde_json::Value>,
}

/// An alert derived from a prediction that met the firing criteria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_id: Uuid,
    pub prediction_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
    pub severity: Severity,
    pub message: String,
    pub model_version: String,
    pub confidence: f64,
}

impl Alert {
    pub fn new(prediction: &Prediction, severity: Severity) -> Self {
        let message = match severity {
            Severity::High => format!(
                "HIGH ALERT: solar flare probability {:.2}",
                prediction.probability
            ),
            Severity::Medium => format!(
                "Elevated solar flare probability {:.2}",
                prediction.probability
            ),
            Severity::Low => format!(
                "Minor solar flare probability {:.2}",
                prediction.probability
            ),
        };

        Self {
            alert_id: Uuid::new_v4(),
            prediction_id: prediction.prediction_id,
            timestamp: prediction.timestamp,
            probability: prediction.probability,
            severity,
            message,
            model_version: prediction.model_version.clone(),
            confidence: prediction.confidence,
        }
    }
}

/// A subscription read from the external subscriptions repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookSubscription {
    pub user_id: Uuid,
    pub tier: Tier,
    pub webhook_url: String,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

/// Server-to-client push messages. Adjacently tagged so the wire shape is
/// `{"type": "...", "data": {...}}`; `ServerFrame` adds the sibling
/// `timestamp` field the protocol requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        connection_id: Uuid,
        authenticated: bool,
        tier: Tier,
        message: String,
    },
    AuthSuccess {
        user_id: Option<Uuid>,
        tier: Option<Tier>,
        message: String,
    },
    AuthError {
        user_id: Option<Uuid>,
        tier: Option<Tier>,
        message: String,
    },
    ThresholdsUpdated {
        thresholds: Option<Thresholds>,
        message: String,
    },
    Error {
        thresholds: Option<Thresholds>,
        message: String,
    },
    Heartbeat {
        message: String,
    },
    HeartbeatAck {
        message: String,
    },
    Alert {
        alert_id: Uuid,
        prediction_id: Uuid,
        timestamp: DateTime<Utc>,
        flare_probability: f64,
        severity_level: Severity,
        alert_triggered: bool,
        message: String,
        model_version: String,
        confidence_score: f64,
    },
}

impl ServerMessage {
    pub fn alert(alert: &Alert) -> Self {
        ServerMessage::Alert {
            alert_id: alert.alert_id,
            prediction_id: alert.prediction_id,
            timestamp: alert.timestamp,
            flare_probability: alert.probability,
            severity_level: alert.severity,
            alert_triggered: true,
            message: alert.message.clone(),
            model_version: alert.model_version.clone(),
            confidence_score: alert.confidence,
        }
    }

    pub fn into_frame(self) -> ServerFrame {
        ServerFrame {
            message: self,
            timestamp: Utc::now(),
        }
    }
}

/// The envelope actually written to the wire: `{type, data, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    #[serde(flatten)]
    pub message: ServerMessage,
    pub timestamp: DateTime<Utc>,
}

/// Client-to-server control messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Heartbeat,
    Authenticate { token: String },
    UpdateThresholds { thresholds: Thresholds },
}

/// The webhook POST body: identical to the `alert` push payload.
pub fn webhook_payload(alert: &Alert) -> ServerMessage {
    ServerMessage::alert(alert)
}
