//! Persisted state layout for a MESH node.

use std::path::PathBuf;

/// Root directory for all MESH state, honoring `MESH_HOME` and falling back
/// to the XDG data directory (`dirs::data_dir()`).
#[derive(Debug, Clone)]
pub struct MeshPaths {
    root: PathBuf,
}

impl MeshPaths {
    pub fn discover() -> Self {
        let root = std::env::var_os("MESH_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("mesh")))
            .unwrap_or_else(|| PathBuf::from(".mesh"));
        MeshPaths { root }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        MeshPaths { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn identity(&self) -> PathBuf {
        self.root.join("config/identity")
    }

    pub fn registry(&self) -> PathBuf {
        self.root.join("config/agent-registry.json")
    }

    pub fn signing_key(&self, peer: &str) -> PathBuf {
        self.root.join(format!("config/signing-keys/{peer}.key"))
    }

    pub fn encryption_key(&self, scope: &str) -> PathBuf {
        self.root.join(format!("config/encryption-keys/{scope}.key"))
    }

    pub fn circuit_breakers(&self) -> PathBuf {
        self.root.join("state/circuit-breakers.json")
    }

    pub fn dead_letters(&self) -> PathBuf {
        self.root.join("state/dead-letters.json")
    }

    pub fn peer_health(&self) -> PathBuf {
        self.root.join("state/peer-health.json")
    }

    pub fn routing_table(&self) -> PathBuf {
        self.root.join("state/routing-table.json")
    }

    pub fn seen_nonces(&self) -> PathBuf {
        self.root.join("state/seen-nonces.log")
    }

    pub fn queue_state(&self) -> PathBuf {
        self.root.join("state/queue-state.json")
    }

    pub fn conversation(&self, conv_id: &str) -> PathBuf {
        self.root.join(format!("state/conversations/{conv_id}.json"))
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.root.join("state/conversations")
    }

    pub fn conversation_archive(&self, conv_id: &str) -> PathBuf {
        self.root
            .join(format!("state/conversations-archive/{conv_id}.json"))
    }

    pub fn session(&self, sanitized_key: &str) -> PathBuf {
        self.root.join(format!("sessions/{sanitized_key}.json"))
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("logs/mesh-audit.jsonl")
    }

    pub fn queue_replay_log(&self) -> PathBuf {
        self.root.join("logs/queue-replay.jsonl")
    }

    pub fn discover_log(&self) -> PathBuf {
        self.root.join("logs/discover.jsonl")
    }
}

/// Make a session key safe to use as a filename component.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
