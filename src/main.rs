mod cli;
mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ConversationCommands, DiscoverCommands, QueueCommands};
use mesh_conversation::ConversationEngine;
use mesh_discovery::{gossip, Elector, Prober};
use mesh_receive::{HostRuntime, InboundRequest};
use mesh_send::{Drainer, SendOptions, Sender};
use mesh_store::{identity, MeshPaths, PeerHealthStore, RegistryStore, RoutingStore};
use mesh_types::{now_ms, MeshError};
use serde_json::Value;

const EXIT_SUCCESS: i32 = 0;
const EXIT_AGENT_ERROR: i32 = 1;
const EXIT_TRANSIENT: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_AGENT_ERROR);
        }
    };

    let paths = match cli.state_dir.clone().or_else(|| cfg.state_dir.clone()) {
        Some(dir) => MeshPaths::with_root(dir),
        None => MeshPaths::discover(),
    };

    let code = match run(cli, cfg, paths).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

/// Map the causing `MeshError`, if any, to this binary's exit code
/// convention. Errors with no `MeshError` cause (config, IO) are permanent.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MeshError>() {
        Some(e) if e.is_permanent() => EXIT_AGENT_ERROR,
        Some(_) => EXIT_TRANSIENT,
        None => EXIT_AGENT_ERROR,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("MESH_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn self_identity(paths: &MeshPaths) -> anyhow::Result<identity::SelfInfo> {
    identity::load_identity(&paths.identity())?.ok_or_else(|| {
        anyhow::anyhow!(
            "no identity on file at {:?}; write config/identity before using this node",
            paths.identity()
        )
    })
}

fn sender_for(paths: &MeshPaths) -> anyhow::Result<Sender> {
    let me = self_identity(paths)?;
    Ok(Sender::new(paths.clone(), me.name, me.ip, me.port))
}

async fn run(cli: Cli, cfg: config::Config, paths: MeshPaths) -> anyhow::Result<()> {
    match cli.command {
        Commands::Send {
            to,
            subject,
            body,
            kind,
            priority,
            ttl,
            conversation_id,
            correlation_id,
            encrypt,
        } => {
            let sender = sender_for(&paths)?;
            let opts = SendOptions {
                correlation_id,
                conversation_id,
                priority: priority.into(),
                ttl,
                encrypt_scope: encrypt,
                ..Default::default()
            };
            let id = sender
                .send(&to, kind.into(), &subject, json!(body), opts)
                .await
                .context("send failed")?;
            println!("sent {id}");
        }

        Commands::Reply {
            to,
            correlation_id,
            body,
        } => {
            let sender = sender_for(&paths)?;
            let opts = SendOptions {
                correlation_id: Some(correlation_id),
                ..Default::default()
            };
            let id = sender
                .send(&to, mesh_types::EnvelopeType::Response, "reply", json!(body), opts)
                .await
                .context("reply failed")?;
            println!("sent {id}");
        }

        Commands::Rally {
            question,
            participants,
            ack,
        } => {
            let sender = sender_for(&paths)?;
            let engine = ConversationEngine::new(&paths);
            let (conv_id, outcome) = engine
                .open_rally(
                    &sender,
                    sender.registry().self_name(),
                    mesh_types::ConversationType::Rally,
                    &question,
                    &participants,
                    ack,
                    now_ms(),
                )
                .await
                .context("opening rally failed")?;
            println!("conversation {conv_id}: sent to {}, {} failed", outcome.sent.len(), outcome.failed.len());
        }

        Commands::Converse {
            kind,
            question,
            participants,
        } => {
            let sender = sender_for(&paths)?;
            let engine = ConversationEngine::new(&paths);
            let (conv_id, outcome) = engine
                .open_rally(
                    &sender,
                    sender.registry().self_name(),
                    kind.into(),
                    &question,
                    &participants,
                    false,
                    now_ms(),
                )
                .await
                .context("opening conversation failed")?;
            println!("conversation {conv_id}: sent to {}, {} failed", outcome.sent.len(), outcome.failed.len());
        }

        Commands::Queue { command } => run_queue(command, &paths).await?,
        Commands::Discover { command } => run_discover(command, &paths).await?,
        Commands::Conversation { command } => run_conversation(command, &paths).await?,

        Commands::Status => {
            let me = self_identity(&paths)?;
            let registry = RegistryStore::open(paths.registry(), me.name.clone());
            let routing = RoutingStore::open(paths.routing_table());
            let health = PeerHealthStore::open(paths.peer_health());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "self": me,
                    "peers": registry.peers().context("reading registry")?,
                    "routing": routing.get().context("reading routing table")?,
                    "health": health.snapshot().context("reading peer health")?,
                }))?
            );
        }

        Commands::Export => {
            let me = self_identity(&paths)?;
            let registry = RegistryStore::open(paths.registry(), me.name.clone());
            let conversations = mesh_store::ConversationStore::new(paths.clone());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "self": me,
                    "registry": registry.snapshot().context("reading registry")?,
                    "conversations": conversations.list_all().context("reading conversations")?,
                }))?
            );
        }

        Commands::Daemon { bind } => {
            let me = self_identity(&paths)?;
            let bind = match bind {
                Some(b) => b,
                None => cfg
                    .daemon
                    .bind
                    .parse()
                    .with_context(|| format!("invalid daemon.bind in config: {}", cfg.daemon.bind))?,
            };
            let daemon_config = mesh_daemon::DaemonConfig::new(me.name, me.ip, me.port, bind)
                .with_drain_interval(std::time::Duration::from_secs(cfg.daemon.drain_interval_secs))
                .with_discover_interval(std::time::Duration::from_secs(cfg.daemon.discover_interval_secs))
                .with_sweep_interval(std::time::Duration::from_secs(cfg.daemon.sweep_interval_secs));
            mesh_daemon::run(daemon_config, paths, Arc::new(UnattendedRuntime)).await?;
        }

        Commands::Completions { shell } => {
            cli::print_completions(shell);
        }
    }
    Ok(())
}

async fn run_queue(command: QueueCommands, paths: &MeshPaths) -> anyhow::Result<()> {
    match command {
        QueueCommands::Status => {
            let dead_letter = mesh_store::DeadLetterStore::open(paths.dead_letters());
            let queue_state = mesh_store::QueueStateStore::open(paths.queue_state());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "queue": dead_letter.snapshot().context("reading dead-letter queue")?,
                    "lastDrain": queue_state.get().context("reading queue state")?,
                }))?
            );
        }
        QueueCommands::Drain => {
            let sender = sender_for(paths)?;
            let drainer = Drainer::new(paths);
            let report = drainer
                .drain_once(&sender, now_ms())
                .await
                .context("drain pass failed")?;
            println!(
                "replayed {}, purged {}, skipped {}",
                report.replayed, report.purged, report.skipped_dead_targets
            );
        }
        QueueCommands::Purge => {
            let dead_letter = mesh_store::DeadLetterStore::open(paths.dead_letters());
            let purged = dead_letter
                .purge_expired(now_ms())
                .context("purge failed")?;
            println!("purged {purged}");
        }
    }
    Ok(())
}

async fn run_discover(command: DiscoverCommands, paths: &MeshPaths) -> anyhow::Result<()> {
    match command {
        DiscoverCommands::Probe => {
            let me = self_identity(paths)?;
            let registry = RegistryStore::open(paths.registry(), me.name);
            let prober = Prober::new(paths);
            let results = prober.probe_all(&registry).await.context("probe failed")?;
            for (name, health) in results {
                println!("{name}: reachable={} latency_ms={:?}", health.reachable, health.latency_ms);
            }
        }
        DiscoverCommands::Status => {
            let health = PeerHealthStore::open(paths.peer_health());
            println!("{}", serde_json::to_string_pretty(&health.snapshot().context("reading peer health")?)?);
        }
        DiscoverCommands::Elect => {
            let me = self_identity(paths)?;
            let registry = RegistryStore::open(paths.registry(), me.name);
            let health = PeerHealthStore::open(paths.peer_health());
            let routing = RoutingStore::open(paths.routing_table());
            let elector = Elector::new(&registry, &health, &routing);
            match elector.elect(now_ms()).context("election failed")? {
                Some(relay) => println!("elected {relay}"),
                None => println!("hub reachable, no election needed"),
            }
        }
        DiscoverCommands::Gossip => {
            let sender = sender_for(paths)?;
            let routing = RoutingStore::open(paths.routing_table());
            let health = PeerHealthStore::open(paths.peer_health());
            let targets: Vec<String> = sender
                .registry()
                .peers()
                .context("reading registry")?
                .into_iter()
                .map(|(name, _)| name)
                .collect();
            let outcome = gossip::broadcast_routing_table(&sender, &routing, &health, &targets).await;
            println!("gossiped to {}, {} failed", outcome.sent.len(), outcome.failed.len());
        }
        DiscoverCommands::Join { to } => {
            let sender = sender_for(paths)?;
            let id = sender
                .send(
                    &to,
                    mesh_types::EnvelopeType::Notification,
                    "join",
                    json!({"self": sender.registry().self_name()}),
                    SendOptions::default(),
                )
                .await
                .context("join announcement failed")?;
            println!("sent {id}");
        }
    }
    Ok(())
}

async fn run_conversation(command: ConversationCommands, paths: &MeshPaths) -> anyhow::Result<()> {
    let engine = ConversationEngine::new(paths);
    match command {
        ConversationCommands::List => {
            for record in engine.store().list_all().context("listing conversations")? {
                println!("{}  {:?}  {}", record.conversation_id, record.status, record.question);
            }
        }
        ConversationCommands::Show { conversation_id } => {
            let record = engine
                .store()
                .get(&conversation_id)
                .context("reading conversation")?
                .ok_or_else(|| anyhow::anyhow!("unknown conversation {conversation_id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ConversationCommands::Complete {
            conversation_id,
            summary,
        } => {
            engine
                .complete(&conversation_id, summary, now_ms())
                .await
                .context("completing conversation failed")?;
            println!("completed {conversation_id}");
        }
        ConversationCommands::Close {
            conversation_id,
            reason,
        } => {
            engine
                .close(&conversation_id, &reason, now_ms())
                .await
                .context("closing conversation failed")?;
            println!("closed {conversation_id}");
        }
        ConversationCommands::Cancel {
            conversation_id,
            reason,
        } => {
            engine
                .cancel(&conversation_id, &reason, now_ms())
                .await
                .context("cancelling conversation failed")?;
            println!("cancelled {conversation_id}");
        }
        ConversationCommands::Timeout => {
            let timed_out = engine.timeout_sweep(now_ms()).await.context("timeout sweep failed")?;
            println!("{} conversation(s) timed out", timed_out.len());
            for id in timed_out {
                println!("  {id}");
            }
        }
        ConversationCommands::Consensus { conversation_id, round } => {
            let consensus = engine
                .consensus(&conversation_id, round)
                .context("computing consensus failed")?;
            println!("{}", serde_json::to_string_pretty(&consensus)?);
        }
        ConversationCommands::Search { query } => {
            let needle = query.to_lowercase();
            let records = engine.store().list_all().context("listing conversations")?;
            let matches: Vec<_> = records
                .into_iter()
                .filter(|r| {
                    r.question.to_lowercase().contains(&needle)
                        || r.summary.as_deref().unwrap_or("").to_lowercase().contains(&needle)
                })
                .collect();
            if matches.is_empty() {
                println!("no matches");
            }
            for record in matches {
                println!("{}  {:?}  {}", record.conversation_id, record.status, record.question);
            }
        }
    }
    Ok(())
}

/// Placeholder host runtime for standalone `mesh daemon` runs: it answers
/// requests with an empty acknowledgement and logs notifications, since the
/// agent runtime that actually interprets message bodies is a separate
/// process this crate does not own.
struct UnattendedRuntime;

#[async_trait::async_trait]
impl HostRuntime for UnattendedRuntime {
    async fn handle_request(&self, request: InboundRequest) -> Value {
        tracing::info!(from = %request.from, subject = %request.subject, "inbound request has no host runtime attached");
        json!({"text": "no host runtime attached"})
    }

    async fn handle_notification(&self, envelope: &mesh_types::Envelope) {
        tracing::info!(from = %envelope.from, kind = ?envelope.kind, "inbound notification has no host runtime attached");
    }

    async fn handle_bare_message(&self, raw: Value) {
        tracing::info!(?raw, "bare inbound message has no host runtime attached");
    }
}
