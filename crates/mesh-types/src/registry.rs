//! Registry entry: a known peer's address, role, and credentials.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    Hub,
    Relay,
    Peer,
    /// Election priority also recognizes an `sre` role as an explicit
    /// relay-eligible designation distinct from `relay`.
    Sre,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub ip: String,
    pub port: u16,
    pub token: String,
    pub role: PeerRole,
    #[serde(rename = "hookPath")]
    pub hook_path: String,
    #[serde(default)]
    pub signing: bool,
}

impl Peer {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    pub fn hook_url(&self, sender: &str) -> String {
        format!("{}/hooks/{}", self.base_url(), sender)
    }

    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.base_url())
    }
}

/// The local node's self-identity plus its view of every other peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "self")]
    pub self_name: String,
    pub peers: std::collections::BTreeMap<String, Peer>,
}
