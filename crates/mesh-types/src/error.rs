use thiserror::Error;

/// The single structured outcome kind the send pipeline (and, by extension,
/// the receive pipeline and CLI) reasons about.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("client error {code} from {peer}")]
    ClientError { peer: String, code: u16 },

    #[error("envelope expired")]
    Expired,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("signature required but missing")]
    SignatureMissing,

    #[error("replay detected")]
    ReplayDetected,

    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("dead-letter queue overflow, oldest entry dropped")]
    QueueOverflow,

    #[error("mesh partitioned: no relay candidate reachable")]
    DiscoveryPartition,

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("relay loop detected")]
    RelayLoop,
}

impl MeshError {
    /// Whether this outcome represents a permanent (non-retryable) failure.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            MeshError::UnknownPeer(_)
                | MeshError::ClientError { .. }
                | MeshError::SignatureInvalid
                | MeshError::SignatureMissing
                | MeshError::ReplayDetected
                | MeshError::Expired
                | MeshError::InvalidEnvelope(_)
                | MeshError::RelayLoop
        )
    }

    /// A short machine-readable reason string, used verbatim in dead-letter
    /// records and audit entries (`circuit_open`, `client_error_404`, …).
    pub fn reason_tag(&self) -> String {
        match self {
            MeshError::CircuitOpen(_) => "circuit_open".to_string(),
            MeshError::ClientError { code, .. } => format!("client_error_{code}"),
            MeshError::Expired => "expired".to_string(),
            MeshError::SignatureInvalid => "rejected_bad_sig".to_string(),
            MeshError::SignatureMissing => "rejected_bad_sig".to_string(),
            MeshError::ReplayDetected => "rejected_replay".to_string(),
            MeshError::UnknownPeer(_) => "unknown_peer".to_string(),
            MeshError::Transport(_) => "transport_exhausted".to_string(),
            MeshError::EncryptionFailure(_) => "encryption_failure".to_string(),
            MeshError::QueueOverflow => "queue_overflow".to_string(),
            MeshError::DiscoveryPartition => "discovery_partition".to_string(),
            MeshError::InvalidEnvelope(_) => "invalid_envelope".to_string(),
            MeshError::Store(_) => "store_error".to_string(),
            MeshError::RelayLoop => "rejected_relay_loop".to_string(),
        }
    }
}
