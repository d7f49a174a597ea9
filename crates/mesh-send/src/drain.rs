//! Replays dead-lettered envelopes against peers that have come back.

use std::collections::BTreeMap;
use std::time::Duration;

use mesh_audit::JsonlLog;
use mesh_store::{MeshPaths, QueueStateStore};
use mesh_types::{now_ms, DeadLetter};
use serde::Serialize;

use crate::sender::{SendOptions, Sender};

const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const REPLAY_SPACING: Duration = Duration::from_millis(1000);

#[derive(Debug, Default, Clone, Copy)]
pub struct DrainReport {
    pub purged: usize,
    pub replayed: u64,
    pub skipped_dead_targets: usize,
}

#[derive(Debug, Serialize)]
struct ReplayLogEntry {
    ts: i64,
    to: String,
    id: String,
    outcome: String,
}

pub struct Drainer {
    queue_state: QueueStateStore,
    replay_log: JsonlLog,
}

impl Drainer {
    pub fn new(paths: &MeshPaths) -> Self {
        Drainer {
            queue_state: QueueStateStore::open(paths.queue_state()),
            replay_log: JsonlLog::new(paths.queue_replay_log()),
        }
    }

    /// One drain pass: pull every dead-lettered entry, retry reachable
    /// targets, skip still-dead ones, and purge expired entries.
    pub async fn drain_once(&self, sender: &Sender, now: i64) -> Result<DrainReport, mesh_types::MeshError> {
        let mut report = DrainReport::default();

        report.purged = sender.dead_letter().purge_expired(now)?;

        let queue = sender.dead_letter().snapshot()?;
        let mut by_target: BTreeMap<String, Vec<DeadLetter>> = BTreeMap::new();
        for entry in queue.entries {
            by_target.entry(entry.to.clone()).or_default().push(entry);
        }

        for (target, entries) in by_target {
            let Ok(peer) = sender.registry().peer(&target) else {
                report.skipped_dead_targets += 1;
                continue;
            };
            if !probe_liveness(&peer.ip, peer.port).await {
                report.skipped_dead_targets += 1;
                continue;
            }

            for entry in entries {
                let opts = SendOptions {
                    reply_context: entry.envelope.reply_context.clone(),
                    ..Default::default()
                };
                let outcome = sender.deliver_once(&peer, &entry.envelope, &opts).await;
                let log_entry = ReplayLogEntry {
                    ts: now_ms(),
                    to: target.clone(),
                    id: entry.id.clone(),
                    outcome: match &outcome {
                        Ok(()) => "replayed".to_string(),
                        Err(e) => e.reason_tag(),
                    },
                };
                let _ = self.replay_log.append(&log_entry).await;

                if outcome.is_ok() {
                    let _ = sender.dead_letter().remove(&entry.id);
                    report.replayed += 1;
                }
                tokio::time::sleep(REPLAY_SPACING).await;
            }
        }

        self.queue_state.record_drain(report.replayed, now)?;
        Ok(report)
    }
}

async fn probe_liveness(ip: &str, port: u16) -> bool {
    tokio::time::timeout(
        LIVENESS_PROBE_TIMEOUT,
        tokio::net::TcpStream::connect((ip, port)),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::MeshPaths;

    #[tokio::test]
    async fn drain_of_empty_queue_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MeshPaths::with_root(dir.path());
        let sender = Sender::new(paths.clone(), "agent-a", "127.0.0.1", 9000);
        let drainer = Drainer::new(&paths);
        let report = drainer.drain_once(&sender, now_ms()).await.unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.purged, 0);
    }

    #[tokio::test]
    async fn unreachable_target_is_skipped_not_errored() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MeshPaths::with_root(dir.path());
        let sender = Sender::new(paths.clone(), "agent-a", "127.0.0.1", 9000);

        sender
            .registry()
            .upsert_peer(
                "agent-b",
                mesh_types::Peer {
                    ip: "127.0.0.1".into(),
                    port: 1, // nothing listens here
                    token: "tok".into(),
                    role: mesh_types::PeerRole::Peer,
                    hook_path: "/hooks/agent-b".into(),
                    signing: false,
                },
            )
            .unwrap();

        let mut envelope =
            mesh_types::Envelope::builder("agent-a", "agent-b", mesh_types::EnvelopeType::Notification);
        envelope.payload.subject = "x".into();
        sender
            .dead_letter()
            .push(DeadLetter {
                id: envelope.id.clone(),
                timestamp: now_ms(),
                to: "agent-b".into(),
                fail_reason: "transport_exhausted".into(),
                attempts: 4,
                envelope,
            })
            .unwrap();

        let drainer = Drainer::new(&paths);
        let report = drainer.drain_once(&sender, now_ms()).await.unwrap();
        assert_eq!(report.skipped_dead_targets, 1);
        assert_eq!(report.replayed, 0);
    }
}
