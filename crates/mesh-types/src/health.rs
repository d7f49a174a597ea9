//! Peer-health and routing-table records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerHealth {
    pub ip: String,
    pub port: u16,
    #[serde(rename = "lastProbe")]
    pub last_probe: i64,
    #[serde(rename = "httpCode", skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(rename = "latencyMs", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub reachable: bool,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshHealth {
    pub up: u32,
    pub down: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(rename = "self")]
    pub self_name: String,
    pub hub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
    #[serde(rename = "meshHealth")]
    pub mesh_health: MeshHealth,
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
    #[serde(rename = "lastElection", skip_serializing_if = "Option::is_none")]
    pub last_election: Option<i64>,
}
