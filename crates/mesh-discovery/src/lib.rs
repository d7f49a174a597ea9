//! Peer discovery, health probing, and relay election.

pub mod election;
pub mod gossip;
pub mod probe;

pub use election::{elect_relay, Elector};
pub use gossip::{broadcast_routing_table, merge_hint};
pub use probe::Prober;
