//! Heartbeat and reaper background loops.

use crate::proto::{ServerFrame, ServerMessage};
use crate::registry::ConnectionRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Every `interval`, snapshot live connections and send each a server
/// heartbeat. Send failure is treated as a dead connection and removed
/// immediately. Never holds the registry while sending.
pub async fn run_heartbeat_loop(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = registry.all();
                let frame = ServerMessage::Heartbeat {
                    message: "server heartbeat".to_string(),
                }
                .into_frame();

                for conn in snapshot {
                    if conn.tx.send(frame.clone()).await.is_err() {
                        warn!(connection_id = %conn.connection_id, "heartbeat send failed, removing connection");
                        registry.remove(conn.connection_id);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!("heartbeat loop shutting down");
                break;
            }
        }
    }
}

/// Every `interval`, remove connections idle for more than `idle_timeout`.
pub async fn run_reaper_loop(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    idle_timeout: chrono::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let stale: Vec<_> = registry
                    .all()
                    .into_iter()
                    .filter(|c| now - c.last_heartbeat > idle_timeout)
                    .map(|c| c.connection_id)
                    .collect();

                for id in &stale {
                    registry.remove(*id);
                }
                if !stale.is_empty() {
                    debug!(count = stale.len(), "reaped idle connections");
                }
            }
            _ = shutdown.cancelled() => {
                debug!("reaper loop shutting down");
                break;
            }
        }
    }
}
