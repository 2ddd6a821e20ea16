use anyhow::{Context, Result};
use clap::Parser;
use flareguard::broadcast::BroadcastEngine;
use flareguard::delivery::DeliveryTracker;
use flareguard::heartbeat::{run_heartbeat_loop, run_reaper_loop};
use flareguard::ports::inmemory::{InMemoryPredictionsRepository, InMemorySubscriptions, StaticTokenValidator};
use flareguard::push::{self, PushState};
use flareguard::queue::OfflineQueue;
use flareguard::registry::ConnectionRegistry;
use flareguard::telemetry;
use flareguard::webhook::WebhookDispatcher;
use flareguard_conf::FlareguardConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Flareguard alert distribution core.
///
/// Configuration is loaded from (in order, later wins):
/// 1. Compiled defaults
/// 2. /etc/flareguard/config.toml
/// 3. ~/.config/flareguard/config.toml
/// 4. ./flareguard.toml (or --config path)
/// 5. Environment variables (FLAREGUARD_*)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides ./flareguard.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show loaded configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FlareguardConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    if cli.show_config {
        println!("{}", config.to_toml());
        return Ok(());
    }

    telemetry::init(&config.telemetry.log_level);
    info!("flareguard starting up");

    let registry = Arc::new(ConnectionRegistry::new());
    let offline_queue = Arc::new(OfflineQueue::new(config.limits.offline_queue_capacity));
    let delivery_tracker = Arc::new(DeliveryTracker::new());
    let webhook_dispatcher = Arc::new(WebhookDispatcher::new(
        Duration::from_secs(config.limits.webhook_timeout_secs),
        config.limits.webhook_concurrency,
    ));
    let subscriptions = Arc::new(InMemorySubscriptions::new());
    let predictions_repo = Arc::new(InMemoryPredictionsRepository::new());

    let broadcast = Arc::new(BroadcastEngine::new(
        registry.clone(),
        offline_queue.clone(),
        delivery_tracker.clone(),
        webhook_dispatcher,
        subscriptions,
        predictions_repo,
        flareguard::proto::Thresholds {
            low: config.thresholds.low,
            medium: config.thresholds.medium,
            high: config.thresholds.high,
        },
        chrono::Duration::seconds(config.limits.high_realert_interval_secs),
    ));

    let push_state = Arc::new(PushState {
        registry: registry.clone(),
        broadcast: broadcast.clone(),
        token_validator: Arc::new(StaticTokenValidator::new()),
    });

    let shutdown_token = CancellationToken::new();

    let heartbeat_ct = shutdown_token.clone();
    let heartbeat_registry = registry.clone();
    let heartbeat_handle = tokio::spawn(async move {
        run_heartbeat_loop(
            heartbeat_registry,
            Duration::from_secs(config.limits.heartbeat_interval_secs),
            heartbeat_ct,
        )
        .await;
    });

    let reaper_ct = shutdown_token.clone();
    let reaper_registry = registry.clone();
    let idle_timeout = chrono::Duration::seconds(config.limits.connection_idle_timeout_secs as i64);
    let reaper_handle = tokio::spawn(async move {
        run_reaper_loop(
            reaper_registry,
            Duration::from_secs(config.limits.reaper_interval_secs),
            idle_timeout,
            reaper_ct,
        )
        .await;
    });

    let cleanup_ct = shutdown_token.clone();
    let cleanup_broadcast = broadcast.clone();
    let delivery_ttl = chrono::Duration::hours(config.limits.delivery_tracker_ttl_hours as i64);
    let queue_ttl = chrono::Duration::days(config.limits.offline_message_ttl_days as i64);
    let cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.limits.cleanup_interval_minutes * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    cleanup_broadcast.periodic_cleanup(delivery_ttl, queue_ttl).await;
                }
                _ = cleanup_ct.cancelled() => {
                    info!("cleanup loop shutting down");
                    break;
                }
            }
        }
    });

    let app = push::router(push_state);
    let bind_addr = format!("{}:{}", config.server.bind_host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "push endpoint listening");

    let server_ct = shutdown_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_ct.cancelled().await;
        info!("server shutdown signal received");
    });

    tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down gracefully");
            shutdown_token.cancel();
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        } => {
            info!("received SIGTERM, shutting down gracefully");
            shutdown_token.cancel();
        }
    }

    let _ = heartbeat_handle.await;
    let _ = reaper_handle.await;
    let _ = cleanup_handle.await;

    Ok(())
}
