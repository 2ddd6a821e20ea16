//! Resource bounds and timing policy - the knobs named in spec section 6.

use serde::{Deserialize, Serialize};

/// Bounds and intervals that govern connections, queues, and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Server heartbeat interval, seconds. Default: 30.
    #[serde(default = "LimitsConfig::default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Idle time after which a connection is reaped, seconds. Default: 300.
    #[serde(default = "LimitsConfig::default_connection_idle_timeout_secs")]
    pub connection_idle_timeout_secs: u64,

    /// Interval between reaper sweeps, seconds. Default: 60.
    #[serde(default = "LimitsConfig::default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Max buffered messages per offline user. Default: 100.
    #[serde(default = "LimitsConfig::default_offline_queue_capacity")]
    pub offline_queue_capacity: usize,

    /// Offline message time-to-live, days. Default: 7.
    #[serde(default = "LimitsConfig::default_offline_message_ttl_days")]
    pub offline_message_ttl_days: u64,

    /// Delivery tracker record time-to-live, hours. Default: 24.
    #[serde(default = "LimitsConfig::default_delivery_tracker_ttl_hours")]
    pub delivery_tracker_ttl_hours: u64,

    /// Per-webhook-request timeout, seconds. Default: 10.
    #[serde(default = "LimitsConfig::default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    /// Max in-flight webhook requests. Default: 32.
    #[serde(default = "LimitsConfig::default_webhook_concurrency")]
    pub webhook_concurrency: usize,

    /// Minimum interval between two HIGH re-alerts, seconds. Default: 3600.
    #[serde(default = "LimitsConfig::default_high_realert_interval_secs")]
    pub high_realert_interval_secs: i64,

    /// Interval between delivery-tracker/offline-queue GC sweeps, minutes. Default: 60.
    #[serde(default = "LimitsConfig::default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl LimitsConfig {
    fn default_heartbeat_interval_secs() -> u64 {
        30
    }
    fn default_connection_idle_timeout_secs() -> u64 {
        300
    }
    fn default_reaper_interval_secs() -> u64 {
        60
    }
    fn default_offline_queue_capacity() -> usize {
        100
    }
    fn default_offline_message_ttl_days() -> u64 {
        7
    }
    fn default_delivery_tracker_ttl_hours() -> u64 {
        24
    }
    fn default_webhook_timeout_secs() -> u64 {
        10
    }
    fn default_webhook_concurrency() -> usize {
        32
    }
    fn default_high_realert_interval_secs() -> i64 {
        3600
    }
    fn default_cleanup_interval_minutes() -> u64 {
        60
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: Self::default_heartbeat_interval_secs(),
            connection_idle_timeout_secs: Self::default_connection_idle_timeout_secs(),
            reaper_interval_secs: Self::default_reaper_interval_secs(),
            offline_queue_capacity: Self::default_offline_queue_capacity(),
            offline_message_ttl_days: Self::default_offline_message_ttl_days(),
            delivery_tracker_ttl_hours: Self::default_delivery_tracker_ttl_hours(),
            webhook_timeout_secs: Self::default_webhook_timeout_secs(),
            webhook_concurrency: Self::default_webhook_concurrency(),
            high_realert_interval_secs: Self::default_high_realert_interval_secs(),
            cleanup_interval_minutes: Self::default_cleanup_interval_minutes(),
        }
    }
}

/// Default per-severity probability thresholds, applied to new connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ThresholdsConfig {
    #[serde(default = "ThresholdsConfig::default_low")]
    pub low: f64,
    #[serde(default = "ThresholdsConfig::default_medium")]
    pub medium: f64,
    #[serde(default = "ThresholdsConfig::default_high")]
    pub high: f64,
}

impl ThresholdsConfig {
    fn default_low() -> f64 {
        0.3
    }
    fn default_medium() -> f64 {
        0.6
    }
    fn default_high() -> f64 {
        0.8
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            low: Self::default_low(),
            medium: Self::default_medium(),
            high: Self::default_high(),
        }
    }
}

/// Network bind address for the push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP/WS bind port. Default: 8090.
    #[serde(default = "ServerConfig::default_http_port")]
    pub http_port: u16,

    /// HTTP/WS bind host. Default: 0.0.0.0.
    #[serde(default = "ServerConfig::default_bind_host")]
    pub bind_host: String,
}

impl ServerConfig {
    fn default_http_port() -> u16 {
        8090
    }
    fn default_bind_host() -> String {
        "0.0.0.0".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
            bind_host: Self::default_bind_host(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive. Default: info.
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.heartbeat_interval_secs, 30);
        assert_eq!(limits.connection_idle_timeout_secs, 300);
        assert_eq!(limits.offline_queue_capacity, 100);
        assert_eq!(limits.webhook_concurrency, 32);
    }

    #[test]
    fn test_thresholds_defaults() {
        let t = ThresholdsConfig::default();
        assert_eq!((t.low, t.medium, t.high), (0.3, 0.6, 0.8));
    }

    #[test]
    fn test_server_defaults() {
        let s = ServerConfig::default();
        assert_eq!(s.http_port, 8090);
    }
}
