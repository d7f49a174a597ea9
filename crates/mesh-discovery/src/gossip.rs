//! Routing-table gossip (optional).
//!
//! Reuses `Sender` to notify reachable peers; receivers treat a
//! gossiped table as a hint and never let it override directly-observed
//! state.

use mesh_send::{BroadcastOutcome, SendOptions, Sender};
use mesh_store::{PeerHealthStore, RoutingStore};
use mesh_types::{EnvelopeType, MeshError};
use serde_json::{json, Value};

pub async fn broadcast_routing_table(
    sender: &Sender,
    routing: &RoutingStore,
    health: &PeerHealthStore,
    targets: &[String],
) -> BroadcastOutcome {
    let table = routing.get().unwrap_or_default();
    let snapshot = health.snapshot().unwrap_or_default();
    let body = json!({"routingTable": table, "peerHealth": snapshot.0});
    sender
        .broadcast(
            targets,
            EnvelopeType::Notification,
            "routing_gossip",
            body,
            SendOptions::default(),
        )
        .await
}

/// Merge a gossiped routing table as a hint: fills an unset `relay` only,
/// never overrides a directly-observed value.
pub fn merge_hint(routing: &RoutingStore, gossip_body: &Value) -> Result<(), MeshError> {
    let Some(hinted_relay) = gossip_body
        .get("routingTable")
        .and_then(|t| t.get("relay"))
        .and_then(|r| r.as_str())
    else {
        return Ok(());
    };
    routing.update(|table| {
        if table.relay.is_none() {
            table.relay = Some(hinted_relay.to_string());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::MeshPaths;

    #[test]
    fn merge_hint_does_not_override_existing_relay() {
        let dir = tempfile::tempdir().unwrap();
        let routing = RoutingStore::open(MeshPaths::with_root(dir.path()).routing_table());
        routing
            .update(|t| t.relay = Some("agent-observed".into()))
            .unwrap();

        merge_hint(&routing, &json!({"routingTable": {"relay": "agent-hinted"}})).unwrap();

        assert_eq!(routing.get().unwrap().relay, Some("agent-observed".to_string()));
    }

    #[test]
    fn merge_hint_fills_unset_relay() {
        let dir = tempfile::tempdir().unwrap();
        let routing = RoutingStore::open(MeshPaths::with_root(dir.path()).routing_table());

        merge_hint(&routing, &json!({"routingTable": {"relay": "agent-hinted"}})).unwrap();

        assert_eq!(routing.get().unwrap().relay, Some("agent-hinted".to_string()));
    }
}
