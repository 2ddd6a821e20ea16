//! Configuration loading for Flareguard.
//!
//! Layered TOML config with env-var overrides, following system -> user ->
//! local -> environment precedence. Every field has a default so the
//! service runs with no config file at all.

mod limits;
mod loader;

pub use limits::{LimitsConfig, ServerConfig, TelemetryConfig, ThresholdsConfig};
pub use loader::{discover_config_files, discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level Flareguard configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlareguardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl FlareguardConfig {
    /// Load config using the default discovery rules (no CLI override).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(discover_config_files())
    }

    /// Load config, honoring a `--config` path in place of local discovery.
    pub fn load_from(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let sources = discover_config_files_with_override(override_path);
        Self::load_with_sources(sources)
    }

    /// Load and merge every discovered source, then apply env overrides.
    pub fn load_with_sources(sources: ConfigSources) -> Result<Self, ConfigError> {
        Self::load_with_sources_from(sources)
    }

    pub fn load_with_sources_from(sources: ConfigSources) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for path in [&sources.system, &sources.user, &sources.local]
            .into_iter()
            .flatten()
        {
            let overlay = loader::load_from_file(path)?;
            config = loader::merge_configs(config, overlay);
        }

        Ok(loader::apply_env_overrides(config))
    }

    /// Render back to TOML text, e.g. for `--show-config`.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("[server]\n");
        out.push_str(&format!("http_port = {}\n", self.server.http_port));
        out.push_str(&format!("bind_host = \"{}\"\n\n", self.server.bind_host));

        out.push_str("[limits]\n");
        out.push_str(&format!(
            "heartbeat_interval_secs = {}\n",
            self.limits.heartbeat_interval_secs
        ));
        out.push_str(&format!(
            "connection_idle_timeout_secs = {}\n",
            self.limits.connection_idle_timeout_secs
        ));
        out.push_str(&format!(
            "reaper_interval_secs = {}\n",
            self.limits.reaper_interval_secs
        ));
        out.push_str(&format!(
            "offline_queue_capacity = {}\n",
            self.limits.offline_queue_capacity
        ));
        out.push_str(&format!(
            "offline_message_ttl_days = {}\n",
            self.limits.offline_message_ttl_days
        ));
        out.push_str(&format!(
            "delivery_tracker_ttl_hours = {}\n",
            self.limits.delivery_tracker_ttl_hours
        ));
        out.push_str(&format!(
            "webhook_timeout_secs = {}\n",
            self.limits.webhook_timeout_secs
        ));
        out.push_str(&format!(
            "webhook_concurrency = {}\n",
            self.limits.webhook_concurrency
        ));
        out.push_str(&format!(
            "high_realert_interval_secs = {}\n",
            self.limits.high_realert_interval_secs
        ));
        out.push_str(&format!(
            "cleanup_interval_minutes = {}\n\n",
            self.limits.cleanup_interval_minutes
        ));

        out.push_str("[thresholds]\n");
        out.push_str(&format!("low = {}\n", self.thresholds.low));
        out.push_str(&format!("medium = {}\n", self.thresholds.medium));
        out.push_str(&format!("high = {}\n\n", self.thresholds.high));

        out.push_str("[telemetry]\n");
        out.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        out
    }
}
