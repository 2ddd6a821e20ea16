//! Config file discovery, TOML parsing, and env-var overlay.

use crate::{ConfigError, FlareguardConfig};
use std::path::{Path, PathBuf};

/// Where a loaded config came from, in precedence order (lowest to highest).
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub system: Option<PathBuf>,
    pub user: Option<PathBuf>,
    pub local: Option<PathBuf>,
}

/// Find config files on disk following system -> user -> local precedence.
///
/// `override_path` (from `--config`) takes the place of the local file when
/// given, matching how the CLI flag shadows the default discovery rule.
pub fn discover_config_files() -> ConfigSources {
    discover_config_files_with_override(None)
}

pub fn discover_config_files_with_override(override_path: Option<&Path>) -> ConfigSources {
    let system = PathBuf::from("/etc/flareguard/config.toml");
    let system = system.is_file().then_some(system);

    let user = directories::BaseDirs::new().and_then(|base| {
        let path = base.home_dir().join(".config/flareguard/config.toml");
        path.is_file().then_some(path)
    });

    let local = match override_path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let path = PathBuf::from("./flareguard.toml");
            path.is_file().then_some(path)
        }
    };

    ConfigSources { system, user, local }
}

pub fn load_from_file(path: &Path) -> Result<FlareguardConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&text)
}

pub fn parse_toml(text: &str) -> Result<FlareguardConfig, ConfigError> {
    let table: toml::Table = text.parse().map_err(|source| ConfigError::Parse { source })?;

    let mut config = FlareguardConfig::default();

    if let Some(server) = table.get("server").and_then(|v| v.as_table()) {
        if let Some(v) = server.get("http_port").and_then(|v| v.as_integer()) {
            config.server.http_port = v as u16;
        }
        if let Some(v) = server.get("bind_host").and_then(|v| v.as_str()) {
            config.server.bind_host = v.to_string();
        }
    }

    if let Some(limits) = table.get("limits").and_then(|v| v.as_table()) {
        macro_rules! set_u64 {
            ($key:literal, $field:ident) => {
                if let Some(v) = limits.get($key).and_then(|v| v.as_integer()) {
                    config.limits.$field = v as u64;
                }
            };
        }
        macro_rules! set_usize {
            ($key:literal, $field:ident) => {
                if let Some(v) = limits.get($key).and_then(|v| v.as_integer()) {
                    config.limits.$field = v as usize;
                }
            };
        }
        set_u64!("heartbeat_interval_secs", heartbeat_interval_secs);
        set_u64!("connection_idle_timeout_secs", connection_idle_timeout_secs);
        set_u64!("reaper_interval_secs", reaper_interval_secs);
        set_usize!("offline_queue_capacity", offline_queue_capacity);
        set_u64!("offline_message_ttl_days", offline_message_ttl_days);
        set_u64!("delivery_tracker_ttl_hours", delivery_tracker_ttl_hours);
        set_u64!("webhook_timeout_secs", webhook_timeout_secs);
        set_usize!("webhook_concurrency", webhook_concurrency);
        set_u64!("cleanup_interval_minutes", cleanup_interval_minutes);
        if let Some(v) = limits.get("high_realert_interval_secs").and_then(|v| v.as_integer()) {
            config.limits.high_realert_interval_secs = v;
        }
    }

    if let Some(thresholds) = table.get("thresholds").and_then(|v| v.as_table()) {
        if let Some(v) = thresholds.get("low").and_then(|v| v.as_float()) {
            config.thresholds.low = v;
        }
        if let Some(v) = thresholds.get("medium").and_then(|v| v.as_float()) {
            config.thresholds.medium = v;
        }
        if let Some(v) = thresholds.get("high").and_then(|v| v.as_float()) {
            config.thresholds.high = v;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge an overlay config onto a base, field by field. A field on the
/// overlay only wins if it differs from that field's own default - this
/// lets a sparse local file shadow individual fields of a fuller system
/// file without clobbering the rest.
pub fn merge_configs(base: FlareguardConfig, overlay: FlareguardConfig) -> FlareguardConfig {
    let default = FlareguardConfig::default();
    let mut merged = base;

    if overlay.server.http_port != default.server.http_port {
        merged.server.http_port = overlay.server.http_port;
    }
    if overlay.server.bind_host != default.server.bind_host {
        merged.server.bind_host = overlay.server.bind_host;
    }

    if overlay.limits.heartbeat_interval_secs != default.limits.heartbeat_interval_secs {
        merged.limits.heartbeat_interval_secs = overlay.limits.heartbeat_interval_secs;
    }
    if overlay.limits.connection_idle_timeout_secs != default.limits.connection_idle_timeout_secs {
        merged.limits.connection_idle_timeout_secs = overlay.limits.connection_idle_timeout_secs;
    }
    if overlay.limits.reaper_interval_secs != default.limits.reaper_interval_secs {
        merged.limits.reaper_interval_secs = overlay.limits.reaper_interval_secs;
    }
    if overlay.limits.offline_queue_capacity != default.limits.offline_queue_capacity {
        merged.limits.offline_queue_capacity = overlay.limits.offline_queue_capacity;
    }
    if overlay.limits.offline_message_ttl_days != default.limits.offline_message_ttl_days {
        merged.limits.offline_message_ttl_days = overlay.limits.offline_message_ttl_days;
    }
    if overlay.limits.delivery_tracker_ttl_hours != default.limits.delivery_tracker_ttl_hours {
        merged.limits.delivery_tracker_ttl_hours = overlay.limits.delivery_tracker_ttl_hours;
    }
    if overlay.limits.webhook_timeout_secs != default.limits.webhook_timeout_secs {
        merged.limits.webhook_timeout_secs = overlay.limits.webhook_timeout_secs;
    }
    if overlay.limits.webhook_concurrency != default.limits.webhook_concurrency {
        merged.limits.webhook_concurrency = overlay.limits.webhook_concurrency;
    }
    if overlay.limits.high_realert_interval_secs != default.limits.high_realert_interval_secs {
        merged.limits.high_realert_interval_secs = overlay.limits.high_realert_interval_secs;
    }
    if overlay.limits.cleanup_interval_minutes != default.limits.cleanup_interval_minutes {
        merged.limits.cleanup_interval_minutes = overlay.limits.cleanup_interval_minutes;
    }

    if overlay.thresholds != default.thresholds {
        merged.thresholds = overlay.thresholds;
    }

    if overlay.telemetry.log_level != default.telemetry.log_level {
        merged.telemetry.log_level = overlay.telemetry.log_level;
    }

    merged
}

/// Apply `FLAREGUARD_*` environment overrides, highest precedence of all.
pub fn apply_env_overrides(mut config: FlareguardConfig) -> FlareguardConfig {
    if let Ok(v) = std::env::var("FLAREGUARD_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.server.http_port = port;
        }
    }
    if let Ok(v) = std::env::var("FLAREGUARD_BIND_HOST") {
        config.server.bind_host = v;
    }
    if let Ok(v) = std::env::var("FLAREGUARD_HEARTBEAT_INTERVAL_SECS") {
        if let Ok(n) = v.parse() {
            config.limits.heartbeat_interval_secs = n;
        }
    }
    if let Ok(v) = std::env::var("FLAREGUARD_CONNECTION_IDLE_TIMEOUT_SECS") {
        if let Ok(n) = v.parse() {
            config.limits.connection_idle_timeout_secs = n;
        }
    }
    if let Ok(v) = std::env::var("FLAREGUARD_OFFLINE_QUEUE_CAPACITY") {
        if let Ok(n) = v.parse() {
            config.limits.offline_queue_capacity = n;
        }
    }
    if let Ok(v) = std::env::var("FLAREGUARD_WEBHOOK_CONCURRENCY") {
        if let Ok(n) = v.parse() {
            config.limits.webhook_concurrency = n;
        }
    }
    // RUST_LOG is the standard tracing-subscriber alias; honor it alongside
    // our own var so the binary behaves like any other tracing-based service.
    if let Ok(v) = std::env::var("RUST_LOG") {
        config.telemetry.log_level = v;
    }
    if let Ok(v) = std::env::var("FLAREGUARD_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }

    config
}

/// Expand a leading `~` and `$VAR` references in a path-like config value.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded = if let Some(rest) = input.strip_prefix("~/") {
        directories::BaseDirs::new()
            .map(|base| base.home_dir().join(rest))
            .unwrap_or_else(|| PathBuf::from(input))
    } else {
        PathBuf::from(input)
    };

    let s = expanded.to_string_lossy();
    if let Some(start) = s.find('$') {
        let rest = &s[start + 1..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        let var_name = &rest[..end];
        if let Ok(value) = std::env::var(var_name) {
            let replaced = format!("{}{}{}", &s[..start], value, &rest[end..]);
            return PathBuf::from(replaced);
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde() {
        std::env::set_var("HOME", "/home/tester");
        let p = expand_path("~/flareguard");
        assert!(p.to_string_lossy().ends_with("flareguard"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let p = expand_path("/etc/flareguard/config.toml");
        assert_eq!(p, PathBuf::from("/etc/flareguard/config.toml"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.server.http_port, FlareguardConfig::default().server.http_port);
    }

    #[test]
    fn test_parse_full_toml() {
        let text = r#"
            [server]
            http_port = 9000
            bind_host = "127.0.0.1"

            [limits]
            offline_queue_capacity = 50
            webhook_concurrency = 8

            [thresholds]
            low = 0.2
            medium = 0.5
            high = 0.9
        "#;
        let config = parse_toml(text).unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.bind_host, "127.0.0.1");
        assert_eq!(config.limits.offline_queue_capacity, 50);
        assert_eq!(config.limits.webhook_concurrency, 8);
        assert_eq!(config.thresholds.low, 0.2);
        assert_eq!(config.thresholds.high, 0.9);
    }

    #[test]
    fn test_merge_configs_overlay_wins_only_when_different() {
        let base = FlareguardConfig::default();
        let mut overlay = FlareguardConfig::default();
        overlay.limits.offline_queue_capacity = 250;
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.limits.offline_queue_capacity, 250);
        assert_eq!(
            merged.limits.webhook_concurrency,
            FlareguardConfig::default().limits.webhook_concurrency
        );
    }

    #[test]
    fn test_discover_config_files_no_override() {
        let sources = discover_config_files_with_override(None);
        // In a clean test environment none of these paths exist.
        let _ = sources;
    }
}
