//! Long-running MESH node.
//!
//! [`run`] assembles the receive-side webhook server with the periodic
//! maintenance tasks the other components need to run unattended: the
//! queue drainer, the peer prober and relay elector, and the
//! conversation/session timeout sweepers. It spawns each maintenance loop
//! in the background, then blocks serving the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use mesh_conversation::ConversationEngine;
use mesh_discovery::{Elector, Prober};
use mesh_receive::{HostRuntime, ReceiveState};
use mesh_send::{Drainer, Sender};
use mesh_session::SessionRouter;
use mesh_store::{MeshPaths, PeerHealthStore, RoutingStore};
use mesh_types::now_ms;

pub struct DaemonConfig {
    pub self_name: String,
    pub self_ip: String,
    pub self_port: u16,
    pub bind: std::net::SocketAddr,
    pub drain_interval: Duration,
    pub discover_interval: Duration,
    pub sweep_interval: Duration,
}

impl DaemonConfig {
    pub fn new(self_name: impl Into<String>, self_ip: impl Into<String>, self_port: u16, bind: std::net::SocketAddr) -> Self {
        DaemonConfig {
            self_name: self_name.into(),
            self_ip: self_ip.into(),
            self_port,
            bind,
            drain_interval: Duration::from_secs(60),
            discover_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn with_discover_interval(mut self, interval: Duration) -> Self {
        self.discover_interval = interval;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Start the node: spawn the three maintenance loops in the background,
/// then serve the webhook router until the process is killed.
pub async fn run(
    config: DaemonConfig,
    paths: MeshPaths,
    runtime: Arc<dyn HostRuntime>,
) -> anyhow::Result<()> {
    let sender = Arc::new(Sender::new(
        paths.clone(),
        config.self_name.clone(),
        config.self_ip.clone(),
        config.self_port,
    ));

    spawn_drain_loop(paths.clone(), sender.clone(), config.drain_interval);
    spawn_discover_loop(paths.clone(), sender.clone(), config.discover_interval);
    spawn_sweep_loop(paths.clone(), config.sweep_interval);

    let receive_state = ReceiveState::new(config.self_name.clone(), paths, sender, runtime)?;
    let app = mesh_receive::router(receive_state);

    tracing::info!(bind = %config.bind, self_name = %config.self_name, "starting MESH webhook server");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}

/// Periodically retries dead-lettered envelopes against live peers.
fn spawn_drain_loop(paths: MeshPaths, sender: Arc<Sender>, interval: Duration) {
    tokio::spawn(async move {
        let drainer = Drainer::new(&paths);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match drainer.drain_once(&sender, now_ms()).await {
                Ok(report) => {
                    if report.replayed > 0 || report.purged > 0 {
                        tracing::info!(
                            replayed = report.replayed,
                            purged = report.purged,
                            skipped = report.skipped_dead_targets,
                            "queue drain pass complete"
                        );
                    }
                }
                Err(e) => tracing::warn!("queue drain pass failed: {e}"),
            }
        }
    });
}

/// Probes peers, then elects a relay if the hub is unreachable.
fn spawn_discover_loop(paths: MeshPaths, sender: Arc<Sender>, interval: Duration) {
    tokio::spawn(async move {
        let prober = Prober::new(&paths);
        let health = PeerHealthStore::open(paths.peer_health());
        let routing = RoutingStore::open(paths.routing_table());
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = prober.probe_all(sender.registry()).await {
                tracing::warn!("peer probe pass failed: {e}");
                continue;
            }
            let elector = Elector::new(sender.registry(), &health, &routing);
            match elector.elect(now_ms()) {
                Ok(Some(relay)) => tracing::info!(relay = %relay, "elected new relay"),
                Ok(None) => {}
                Err(e) => tracing::warn!("relay election failed: {e}"),
            }
        }
    });
}

/// Flags timed-out conversations and closes stale sessions.
fn spawn_sweep_loop(paths: MeshPaths, interval: Duration) {
    tokio::spawn(async move {
        let conversations = ConversationEngine::new(&paths);
        let sessions = mesh_store::SessionStore::new(paths.clone());
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match conversations.timeout_sweep(now_ms()).await {
                Ok(timed_out) if !timed_out.is_empty() => {
                    tracing::info!(count = timed_out.len(), "conversations timed out");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("conversation timeout sweep failed: {e}"),
            }

            let router = SessionRouter::new(&sessions);
            match router.sweep_expired(now_ms(), mesh_session::DEFAULT_SESSION_TTL_SECS) {
                Ok(closed) if !closed.is_empty() => {
                    tracing::info!(count = closed.len(), "sessions closed as stale");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("session sweep failed: {e}"),
            }
        }
    });
}
