//! `mesh` argument parsing: a flat `Commands` enum with nested subcommands
//! for grouped verbs, doc comments doubling as help text.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use mesh_types::{ConversationType, EnvelopeType, Priority};

#[derive(Parser, Debug)]
#[command(
    name = "mesh",
    about = "Operator CLI for a MESH inter-agent messaging node",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// State directory root (overrides MESH_HOME, the config file, and the
    /// XDG default).
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Path to a config file (overrides layered auto-discovery).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EnvelopeTypeArg {
    Request,
    Notification,
    Alert,
    Ack,
}

impl From<EnvelopeTypeArg> for EnvelopeType {
    fn from(v: EnvelopeTypeArg) -> Self {
        match v {
            EnvelopeTypeArg::Request => EnvelopeType::Request,
            EnvelopeTypeArg::Notification => EnvelopeType::Notification,
            EnvelopeTypeArg::Alert => EnvelopeType::Alert,
            EnvelopeTypeArg::Ack => EnvelopeType::Ack,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(v: PriorityArg) -> Self {
        match v {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConversationTypeArg {
    Collab,
    Escalation,
    Broadcast,
    Opinion,
    Brainstorm,
}

impl From<ConversationTypeArg> for ConversationType {
    fn from(v: ConversationTypeArg) -> Self {
        match v {
            ConversationTypeArg::Collab => ConversationType::Collab,
            ConversationTypeArg::Escalation => ConversationType::Escalation,
            ConversationTypeArg::Broadcast => ConversationType::Broadcast,
            ConversationTypeArg::Opinion => ConversationType::Opinion,
            ConversationTypeArg::Brainstorm => ConversationType::Brainstorm,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single envelope to one peer.
    Send {
        /// Registered peer name to send to.
        to: String,
        /// `payload.subject`.
        subject: String,
        /// `payload.body`, sent as a plain string.
        body: String,
        #[arg(long, value_enum, default_value = "notification")]
        kind: EnvelopeTypeArg,
        #[arg(long, value_enum, default_value = "normal")]
        priority: PriorityArg,
        /// Override the default envelope TTL, in seconds.
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(long)]
        conversation_id: Option<String>,
        #[arg(long)]
        correlation_id: Option<String>,
        /// Encrypt `payload.body` under this key scope before sending.
        #[arg(long)]
        encrypt: Option<String>,
    },

    /// Send a `type=response` envelope correlated to an earlier request.
    Reply {
        /// Registered peer name to reply to.
        to: String,
        /// The `correlationId` this reply answers.
        correlation_id: String,
        body: String,
    },

    /// Open a rally: the simplest poll-style conversation.
    Rally {
        question: String,
        /// Comma-separated list of registered peer names.
        #[arg(long, value_delimiter = ',')]
        participants: Vec<String>,
        /// Require an acknowledgement from every participant (broadcast only).
        #[arg(long)]
        ack: bool,
    },

    /// Open a conversation of an explicit type other than `rally`.
    Converse {
        #[arg(value_enum)]
        kind: ConversationTypeArg,
        question: String,
        #[arg(long, value_delimiter = ',')]
        participants: Vec<String>,
    },

    /// Dead-letter queue inspection and maintenance.
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Peer discovery and relay election.
    Discover {
        #[command(subcommand)]
        command: DiscoverCommands,
    },

    /// Multi-round conversation inspection and control.
    Conversation {
        #[command(subcommand)]
        command: ConversationCommands,
    },

    /// Print this node's identity, registry, and routing snapshot.
    Status,

    /// Dump the full conversation and registry state as JSON to stdout.
    Export,

    /// Run the long-lived node: webhook server plus periodic maintenance.
    Daemon {
        /// Address to bind the webhook server to (overrides the config file).
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },

    /// Generate shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Show the dead-letter queue's current depth and last drain time.
    Status,
    /// Run one drain pass immediately.
    Drain,
    /// Purge every expired dead-letter entry without replaying.
    Purge,
}

#[derive(Subcommand, Debug)]
pub enum DiscoverCommands {
    /// Probe every registered peer once and persist the results.
    Probe,
    /// Print the last known health of every peer.
    Status,
    /// Run one relay-election pass.
    Elect,
    /// Broadcast this node's routing table + peer-health snapshot as a hint.
    Gossip,
    /// Announce this node to a peer not yet in its registry.
    Join {
        /// The peer to announce to.
        to: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConversationCommands {
    /// List every known conversation id and its status.
    List,
    /// Show one conversation's full record.
    Show { conversation_id: String },
    /// Mark a conversation complete with an optional summary.
    Complete {
        conversation_id: String,
        summary: Option<String>,
    },
    /// Close a conversation with a reason.
    Close {
        conversation_id: String,
        reason: String,
    },
    /// Cancel a conversation with a reason.
    Cancel {
        conversation_id: String,
        reason: String,
    },
    /// Run one timeout sweep over every active conversation now.
    Timeout,
    /// Compute (and persist) the consensus verdict for a round.
    Consensus {
        conversation_id: String,
        #[arg(long)]
        round: Option<u32>,
    },
    /// Search conversations by a substring of their question or summary.
    Search { query: String },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mesh", &mut std::io::stdout());
}
