//! Peer liveness probing.

use std::time::Duration;

use mesh_audit::JsonlLog;
use mesh_store::{MeshPaths, PeerHealthStore, RegistryStore};
use mesh_types::{now_ms, MeshError, Peer, PeerHealth};
use serde::Serialize;

const STATUS_TIMEOUT: Duration = Duration::from_secs(3);
const TCP_FALLBACK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
struct ProbeLogEntry {
    ts: i64,
    peer: String,
    reachable: bool,
    #[serde(rename = "latencyMs")]
    latency_ms: u64,
}

pub struct Prober {
    client: reqwest::Client,
    health: PeerHealthStore,
    log: JsonlLog,
}

impl Prober {
    pub fn new(paths: &MeshPaths) -> Self {
        let client = reqwest::Client::builder()
            .timeout(STATUS_TIMEOUT)
            .build()
            .expect("reqwest client config is valid");
        Prober {
            client,
            health: PeerHealthStore::open(paths.peer_health()),
            log: JsonlLog::new(paths.discover_log()),
        }
    }

    pub fn health(&self) -> &PeerHealthStore {
        &self.health
    }

    /// Probe one peer with `GET /api/status` (no auth), falling back to a
    /// bare TCP connect. Never POSTs to `/hooks/*` — that would wake the
    /// agent and burn tokens.
    pub async fn probe_one(&self, name: &str, peer: &Peer) -> PeerHealth {
        let started = now_ms();
        let (reachable, http_code) = match self.client.get(peer.status_url()).send().await {
            Ok(resp) => (resp.status().is_success(), Some(resp.status().as_u16())),
            Err(_) => (self.tcp_fallback(peer).await, None),
        };
        let latency_ms = (now_ms() - started).max(0) as u64;
        let prior = self.health.get(name).ok().flatten();
        let consecutive_failures = if reachable {
            0
        } else {
            prior.map(|p| p.consecutive_failures + 1).unwrap_or(1)
        };

        PeerHealth {
            ip: peer.ip.clone(),
            port: peer.port,
            last_probe: now_ms(),
            http_code,
            latency_ms: Some(latency_ms),
            reachable,
            consecutive_failures,
        }
    }

    async fn tcp_fallback(&self, peer: &Peer) -> bool {
        tokio::time::timeout(
            TCP_FALLBACK_TIMEOUT,
            tokio::net::TcpStream::connect((peer.ip.as_str(), peer.port)),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    /// Probe every non-self peer in the registry, persisting results.
    pub async fn probe_all(
        &self,
        registry: &RegistryStore,
    ) -> Result<Vec<(String, PeerHealth)>, MeshError> {
        let mut results = Vec::new();
        for (name, peer) in registry.peers()? {
            let health = self.probe_one(&name, &peer).await;
            self.health.set(&name, health.clone())?;
            let _ = self
                .log
                .append(&ProbeLogEntry {
                    ts: now_ms(),
                    peer: name.clone(),
                    reachable: health.reachable,
                    latency_ms: health.latency_ms.unwrap_or(0),
                })
                .await;
            results.push((name, health));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::MeshPaths;
    use mesh_types::PeerRole;

    #[tokio::test]
    async fn unreachable_peer_falls_back_to_tcp_and_reports_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MeshPaths::with_root(dir.path());
        let prober = Prober::new(&paths);
        let peer = Peer {
            ip: "127.0.0.1".into(),
            port: 1, // nothing listens here
            token: "tok".into(),
            role: PeerRole::Peer,
            hook_path: "/hooks/agent-b".into(),
            signing: false,
        };
        let health = prober.probe_one("agent-b", &peer).await;
        assert!(!health.reachable);
        assert_eq!(health.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn consecutive_failures_accumulate_across_probes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MeshPaths::with_root(dir.path());
        let prober = Prober::new(&paths);
        let peer = Peer {
            ip: "127.0.0.1".into(),
            port: 1,
            token: "tok".into(),
            role: PeerRole::Peer,
            hook_path: "/hooks/agent-b".into(),
            signing: false,
        };
        let first = prober.probe_one("agent-b", &peer).await;
        prober.health().set("agent-b", first).unwrap();
        let second = prober.probe_one("agent-b", &peer).await;
        assert_eq!(second.consecutive_failures, 2);
    }
}
