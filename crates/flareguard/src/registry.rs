//! Connection Registry: tracks live push connections and the user -> connections index.

use crate::error::RegistryError;
use crate::proto::{ServerFrame, Thresholds, Tier};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ConnectionId = Uuid;
pub type UserId = Uuid;

/// The outbound side of a connection: a channel a writer task drains.
///
/// One outstanding send at a time per connection (the channel itself
/// serializes them), matching the push protocol's per-connection ordering
/// guarantee.
pub type OutboundSender = mpsc::Sender<ServerFrame>;

/// State held per live connection. `tx` is the capability the registry uses
/// to deliver; everything else is registry-owned bookkeeping.
#[derive(Clone)]
pub struct ConnectionState {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    pub tier: Tier,
    pub thresholds: Thresholds,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub authenticated: bool,
    pub tx: OutboundSender,
}

impl ConnectionState {
    pub fn new(connection_id: ConnectionId, tx: OutboundSender) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            user_id: None,
            tier: Tier::Free,
            thresholds: Thresholds::default(),
            connected_at: now,
            last_heartbeat: now,
            authenticated: false,
            tx,
        }
    }
}

/// In-memory registry of live push connections.
///
/// Primary map and user index are both sharded concurrent maps rather than
/// a single global mutex: every single-key operation is linearizable, and
/// broadcast fan-out collects a snapshot `Vec` of handles without holding
/// any shard guard across the sends that follow.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionState>,
    by_user: DashMap<UserId, DashSet<ConnectionId>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    pub fn add(&self, tx: OutboundSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(id, ConnectionState::new(id, tx));
        id
    }

    /// Removes a connection, cleaning both the primary map and the user
    /// index; empty user sets are dropped.
    pub fn remove(&self, id: ConnectionId) {
        let Some((_, state)) = self.connections.remove(&id) else {
            return;
        };
        if let Some(user_id) = state.user_id {
            if let Some(set) = self.by_user.get(&user_id) {
                set.remove(&id);
                let empty = set.is_empty();
                drop(set);
                if empty {
                    self.by_user.remove(&user_id);
                }
            }
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(|e| e.clone())
    }

    /// Snapshot of every live connection handle. Callers must not hold this
    /// across any registry mutation; it is a point-in-time copy.
    pub fn all(&self) -> Vec<ConnectionState> {
        self.connections.iter().map(|e| e.clone()).collect()
    }

    pub fn by_user(&self, user_id: UserId) -> Vec<ConnectionState> {
        let Some(ids) = self.by_user.get(&user_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.connections.get(&*id).map(|e| e.clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn count_authenticated(&self) -> usize {
        self.connections.iter().filter(|e| e.authenticated).count()
    }

    pub fn count_for_user(&self, user_id: UserId) -> usize {
        self.by_user.get(&user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Idempotent if called again with the same `user_id`.
    pub fn authenticate(&self, id: ConnectionId, user_id: UserId, tier: Tier) -> Result<(), RegistryError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        entry.user_id = Some(user_id);
        entry.tier = tier;
        entry.authenticated = true;
        drop(entry);

        self.by_user
            .entry(user_id)
            .or_insert_with(DashSet::new)
            .insert(id);
        Ok(())
    }

    /// Validates the triple before applying it; rejects non-monotonic or
    /// out-of-range thresholds without touching existing state.
    pub fn update_thresholds(&self, id: ConnectionId, thresholds: Thresholds) -> Result<(), RegistryError> {
        if !thresholds.is_monotonic() {
            return Err(RegistryError::InvalidThresholds);
        }
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        entry.thresholds = thresholds;
        Ok(())
    }

    pub fn record_heartbeat(&self, id: ConnectionId) {
        if let Entry::Occupied(mut entry) = self.connections.entry(id) {
            entry.get_mut().last_heartbeat = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_one_connection() -> (Arc<ConnectionRegistry>, ConnectionId, mpsc::Receiver<ServerFrame>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let id = registry.add(tx);
        (registry, id, rx)
    }

    #[test]
    fn test_add_and_get() {
        let (registry, id, _rx) = registry_with_one_connection();
        let conn = registry.get(id).unwrap();
        assert!(!conn.authenticated);
        assert_eq!(conn.tier, Tier::Free);
    }

    #[test]
    fn test_authenticate_populates_user_index() {
        let (registry, id, _rx) = registry_with_one_connection();
        let user_id = Uuid::new_v4();
        registry.authenticate(id, user_id, Tier::Pro).unwrap();

        let conn = registry.get(id).unwrap();
        assert!(conn.authenticated);
        assert_eq!(conn.user_id, Some(user_id));
        assert_eq!(registry.count_for_user(user_id), 1);
        assert_eq!(registry.by_user(user_id).len(), 1);
    }

    #[test]
    fn test_authenticate_idempotent() {
        let (registry, id, _rx) = registry_with_one_connection();
        let user_id = Uuid::new_v4();
        registry.authenticate(id, user_id, Tier::Pro).unwrap();
        registry.authenticate(id, user_id, Tier::Pro).unwrap();
        assert_eq!(registry.count_for_user(user_id), 1);
    }

    #[test]
    fn test_remove_cleans_user_index() {
        let (registry, id, _rx) = registry_with_one_connection();
        let user_id = Uuid::new_v4();
        registry.authenticate(id, user_id, Tier::Pro).unwrap();
        registry.remove(id);

        assert!(registry.get(id).is_none());
        assert_eq!(registry.count_for_user(user_id), 0);
        assert!(registry.by_user(user_id).is_empty());
    }

    #[test]
    fn test_update_thresholds_rejects_non_monotonic() {
        let (registry, id, _rx) = registry_with_one_connection();
        let err = registry
            .update_thresholds(
                id,
                Thresholds {
                    low: 0.9,
                    medium: 0.5,
                    high: 0.4,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidThresholds));

        let conn = registry.get(id).unwrap();
        assert_eq!(conn.thresholds, Thresholds::default());
    }

    #[test]
    fn test_update_thresholds_accepts_valid() {
        let (registry, id, _rx) = registry_with_one_connection();
        let t = Thresholds {
            low: 0.1,
            medium: 0.4,
            high: 0.7,
        };
        registry.update_thresholds(id, t).unwrap();
        assert_eq!(registry.get(id).unwrap().thresholds, t);
    }

    #[test]
    fn test_unknown_connection_errors() {
        let registry = ConnectionRegistry::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.authenticate(missing, Uuid::new_v4(), Tier::Free),
            Err(RegistryError::UnknownConnection(_))
        ));
    }
}
