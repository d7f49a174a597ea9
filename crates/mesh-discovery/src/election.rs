//! Relay election.
//!
//! Election is purely local: each node reaches its own view from its own
//! probe results, no consensus is attempted.

use std::collections::BTreeMap;

use mesh_store::{PeerHealthStore, RegistryStore, RoutingStore};
use mesh_types::{MeshError, Peer, PeerHealth, PeerRole};

fn is_reachable(health: &BTreeMap<String, PeerHealth>, name: &str) -> bool {
    health.get(name).map(|h| h.reachable).unwrap_or(false)
}

/// Priority: explicit `role ∈ {relay, sre}` reachable first; else the
/// reachable peer with lowest latency; else `DiscoveryPartition`.
pub fn elect_relay(
    self_name: &str,
    peers: &[(String, Peer)],
    health: &BTreeMap<String, PeerHealth>,
) -> Result<String, MeshError> {
    let mut explicit: Vec<&String> = peers
        .iter()
        .filter(|(name, p)| {
            name != self_name
                && matches!(p.role, PeerRole::Relay | PeerRole::Sre)
                && is_reachable(health, name)
        })
        .map(|(name, _)| name)
        .collect();
    explicit.sort();
    if let Some(name) = explicit.into_iter().next() {
        return Ok(name.clone());
    }

    peers
        .iter()
        .filter(|(name, _)| name != self_name && is_reachable(health, name))
        .min_by_key(|(name, _)| health.get(name.as_str()).and_then(|h| h.latency_ms).unwrap_or(u64::MAX))
        .map(|(name, _)| name.clone())
        .ok_or(MeshError::DiscoveryPartition)
}

pub struct Elector<'a> {
    registry: &'a RegistryStore,
    health: &'a PeerHealthStore,
    routing: &'a RoutingStore,
}

impl<'a> Elector<'a> {
    pub fn new(registry: &'a RegistryStore, health: &'a PeerHealthStore, routing: &'a RoutingStore) -> Self {
        Elector { registry, health, routing }
    }

    fn determine_hub(&self) -> Result<String, MeshError> {
        let peers = self.registry.peers()?;
        if let Some((name, _)) = peers.iter().find(|(_, p)| p.role == PeerRole::Hub) {
            return Ok(name.clone());
        }
        let mut names: Vec<String> = peers.into_iter().map(|(n, _)| n).collect();
        names.sort();
        names.into_iter().next().ok_or(MeshError::DiscoveryPartition)
    }

    /// Run one election pass. If the hub is reachable, nothing changes and
    /// `Ok(None)` is returned. Otherwise a relay is elected and persisted
    /// with `lastElection` recorded.
    pub fn elect(&self, now: i64) -> Result<Option<String>, MeshError> {
        let table = self.routing.get()?;
        let hub = if table.hub.is_empty() {
            self.determine_hub()?
        } else {
            table.hub.clone()
        };
        let snapshot = self.health.snapshot()?;

        if is_reachable(&snapshot.0, &hub) {
            self.routing.update(|t| {
                t.self_name = self.registry.self_name().to_string();
                t.hub = hub.clone();
            })?;
            return Ok(None);
        }

        let peers = self.registry.peers()?;
        let relay = elect_relay(self.registry.self_name(), &peers, &snapshot.0)?;

        self.routing.update(|t| {
            t.self_name = self.registry.self_name().to_string();
            t.hub = hub.clone();
            t.relay = Some(relay.clone());
            t.last_updated = now;
            t.last_election = Some(now);
        })?;
        Ok(Some(relay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{now_ms, PeerHealth};

    fn peer(role: PeerRole) -> Peer {
        Peer {
            ip: "127.0.0.1".into(),
            port: 9000,
            token: "tok".into(),
            role,
            hook_path: "/hooks/x".into(),
            signing: false,
        }
    }

    fn health(reachable: bool, latency_ms: u64) -> PeerHealth {
        PeerHealth {
            ip: "127.0.0.1".into(),
            port: 9000,
            last_probe: now_ms(),
            http_code: Some(200),
            latency_ms: Some(latency_ms),
            reachable,
            consecutive_failures: 0,
        }
    }

    #[test]
    fn explicit_relay_role_wins_over_lower_latency_peer() {
        let peers = vec![
            ("agent-fast".to_string(), peer(PeerRole::Peer)),
            ("agent-relay".to_string(), peer(PeerRole::Relay)),
        ];
        let mut h = BTreeMap::new();
        h.insert("agent-fast".to_string(), health(true, 1));
        h.insert("agent-relay".to_string(), health(true, 500));

        let chosen = elect_relay("agent-self", &peers, &h).unwrap();
        assert_eq!(chosen, "agent-relay");
    }

    #[test]
    fn falls_back_to_lowest_latency_when_no_explicit_role() {
        let peers = vec![
            ("agent-a".to_string(), peer(PeerRole::Peer)),
            ("agent-b".to_string(), peer(PeerRole::Peer)),
        ];
        let mut h = BTreeMap::new();
        h.insert("agent-a".to_string(), health(true, 200));
        h.insert("agent-b".to_string(), health(true, 50));

        let chosen = elect_relay("agent-self", &peers, &h).unwrap();
        assert_eq!(chosen, "agent-b");
    }

    #[test]
    fn no_reachable_peer_is_discovery_partition() {
        let peers = vec![("agent-a".to_string(), peer(PeerRole::Peer))];
        let h = BTreeMap::new();
        assert!(matches!(
            elect_relay("agent-self", &peers, &h),
            Err(MeshError::DiscoveryPartition)
        ));
    }
}
