//! Data model shared across the MESH workspace: the wire envelope and every
//! on-disk state-store record, plus the structured error taxonomy the send
//! and receive pipelines return.

pub mod audit;
pub mod circuit;
pub mod conversation;
pub mod deadletter;
pub mod envelope;
pub mod error;
pub mod health;
pub mod registry;
pub mod session_record;
pub mod time;

pub use audit::AuditEntry;
pub use circuit::{CircuitRecord, CircuitState};
pub use conversation::{
    Consensus, ConsensusVerdict, ConversationRecord, ConversationStatus, ConversationType,
    ParticipantResponse, Round, RoundStatus,
};
pub use deadletter::{DeadLetter, DeadLetterQueue, DEFAULT_MAX_QUEUE};
pub use envelope::{
    Attachment, Envelope, EnvelopeType, Payload, Priority, RelayHint, ReplyTo, SessionRef,
    DEFAULT_TTL_SECS, PROTOCOL,
};
pub use error::MeshError;
pub use health::{MeshHealth, PeerHealth, RoutingTable};
pub use registry::{Peer, PeerRole, Registry};
pub use session_record::{SessionMessage, SessionRecord, SessionStatus, DEFAULT_RING_CAP};
pub use time::{from_iso8601_millis, now_ms, to_iso8601_millis};
