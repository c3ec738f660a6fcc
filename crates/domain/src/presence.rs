use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::participant::ParticipantKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PresenceBinding {
    pub kind: ParticipantKind,
    pub participant_id: String,
}

#[derive(Clone, Debug, Default)]
struct ConnectionState {
    binding: Option<PresenceBinding>,
    rooms: HashSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PresenceChange {
    pub binding: PresenceBinding,
    pub is_online: bool,
}

/// Process-local; presence is derived from the connection table on every query.
#[derive(Default)]
pub struct PresenceRegistry {
    connections: RwLock<HashMap<String, ConnectionState>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, connection_id: &str) {
        self.connections
            .write()
            .await
            .entry(connection_id.to_string())
            .or_default();
    }

    /// Binds a connection to a participant and joins its personal channel.
    /// Returns the offline transition of whoever the connection was bound to
    /// before, when that participant has no connection left.
    pub async fn register(
        &self,
        connection_id: &str,
        kind: ParticipantKind,
        participant_id: &str,
    ) -> Option<PresenceChange> {
        let binding = PresenceBinding {
            kind,
            participant_id: participant_id.to_string(),
        };
        let mut connections = self.connections.write().await;
        let state = connections.entry(connection_id.to_string()).or_default();
        let previous = state.binding.replace(binding.clone());
        if let Some(previous) = previous.as_ref() {
            state
                .rooms
                .remove(&previous.kind.personal_channel(&previous.participant_id));
        }
        state.rooms.insert(kind.personal_channel(participant_id));

        previous
            .filter(|previous| previous.participant_id != binding.participant_id)
            .filter(|previous| Self::bound_count(&connections, &previous.participant_id) == 0)
            .map(|previous| PresenceChange {
                binding: previous,
                is_online: false,
            })
    }

    /// Personal channels are joined only through `register`; naming one
    /// the connection is not bound to is refused.
    pub async fn join_room(&self, connection_id: &str, room_id: &str) -> bool {
        let mut connections = self.connections.write().await;
        let Some(state) = connections.get_mut(connection_id) else {
            return false;
        };
        if ParticipantKind::is_personal_channel(room_id) {
            return state.rooms.contains(room_id);
        }
        state.rooms.insert(room_id.to_string());
        true
    }

    pub async fn disconnect(&self, connection_id: &str) -> Option<PresenceChange> {
        let mut connections = self.connections.write().await;
        let binding = connections.remove(connection_id)?.binding?;
        if Self::bound_count(&connections, &binding.participant_id) > 0 {
            return None;
        }
        Some(PresenceChange {
            binding,
            is_online: false,
        })
    }

    pub async fn binding(&self, connection_id: &str) -> Option<PresenceBinding> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .and_then(|state| state.binding.clone())
    }

    pub async fn is_online(&self, participant_id: &str) -> bool {
        Self::bound_count(&*self.connections.read().await, participant_id) > 0
    }

    pub async fn online_ids(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter_map(|state| state.binding.as_ref())
            .map(|binding| binding.participant_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn connections_in_room(&self, room_id: &str) -> Vec<String> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(_, state)| state.rooms.contains(room_id))
            .map(|(connection_id, _)| connection_id.clone())
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    fn bound_count(
        connections: &HashMap<String, ConnectionState>,
        participant_id: &str,
    ) -> usize {
        connections
            .values()
            .filter(|state| {
                state
                    .binding
                    .as_ref()
                    .is_some_and(|binding| binding.participant_id == participant_id)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_registration_comes_online_and_joins_personal_channel() {
        let registry = PresenceRegistry::new();
        registry.connect("conn-1").await;

        let went_offline = registry
            .register("conn-1", ParticipantKind::User, "u1")
            .await;

        assert!(went_offline.is_none());
        assert!(registry.is_online("u1").await);
        assert_eq!(
            registry.connections_in_room("user_u1").await,
            vec!["conn-1".to_string()]
        );
    }

    #[tokio::test]
    async fn second_tab_does_not_go_offline_early() {
        let registry = PresenceRegistry::new();
        registry.connect("tab-1").await;
        registry.connect("tab-2").await;
        registry.register("tab-1", ParticipantKind::Vendor, "v1").await;
        registry.register("tab-2", ParticipantKind::Vendor, "v1").await;

        assert!(registry.disconnect("tab-1").await.is_none());
        assert!(registry.is_online("v1").await);

        let change = registry.disconnect("tab-2").await.expect("offline");
        assert!(!change.is_online);
        assert_eq!(change.binding.kind, ParticipantKind::Vendor);
        assert!(!registry.is_online("v1").await);
    }

    #[tokio::test]
    async fn anonymous_disconnect_reports_nothing() {
        let registry = PresenceRegistry::new();
        registry.connect("conn-1").await;
        assert!(registry.join_room("conn-1", "c1").await);
        assert!(registry.disconnect("conn-1").await.is_none());
        assert!(registry.connections_in_room("c1").await.is_empty());
    }

    #[tokio::test]
    async fn personal_channels_are_only_reachable_by_registering() {
        let registry = PresenceRegistry::new();
        registry.connect("owner").await;
        registry.connect("spy").await;
        registry.register("owner", ParticipantKind::User, "u1").await;

        assert!(!registry.join_room("spy", "user_u1").await);
        assert!(registry.join_room("owner", "user_u1").await);
        assert_eq!(
            registry.connections_in_room("user_u1").await,
            vec!["owner".to_string()]
        );
    }

    #[tokio::test]
    async fn rebinding_a_connection_moves_presence() {
        let registry = PresenceRegistry::new();
        registry.connect("conn-1").await;
        registry.register("conn-1", ParticipantKind::User, "u1").await;

        let went_offline = registry.register("conn-1", ParticipantKind::User, "u2").await;

        assert_eq!(
            went_offline.map(|change| change.binding.participant_id),
            Some("u1".to_string())
        );
        assert_eq!(registry.online_ids().await, vec!["u2".to_string()]);
        assert!(registry.connections_in_room("user_u1").await.is_empty());
    }

    #[tokio::test]
    async fn online_snapshot_is_deduplicated() {
        let registry = PresenceRegistry::new();
        for (connection, kind, id) in [
            ("a", ParticipantKind::User, "u1"),
            ("b", ParticipantKind::User, "u1"),
            ("c", ParticipantKind::Vendor, "v1"),
        ] {
            registry.connect(connection).await;
            registry.register(connection, kind, id).await;
        }
        registry.connect("anon").await;

        assert_eq!(
            registry.online_ids().await,
            vec!["u1".to_string(), "v1".to_string()]
        );
        assert_eq!(registry.connection_count().await, 4);
    }
}
