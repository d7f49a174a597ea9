//! Persisted state stores. Every accessor
//! is a typed wrapper around [`locked::LockedJsonStore`] — an exclusive
//! file lock around read-modify-write, atomic temp-file-then-rename on
//! write.

pub mod circuit;
pub mod conversation;
pub mod deadletter;
pub mod error;
pub mod health;
pub mod identity;
pub mod keys;
pub mod locked;
pub mod nonce;
pub mod paths;
pub mod queue_state;
pub mod registry;
pub mod session;

pub use circuit::{CircuitStore, CircuitTable};
pub use conversation::ConversationStore;
pub use deadletter::DeadLetterStore;
pub use error::StoreError;
pub use health::{PeerHealthStore, PeerHealthTable, RoutingStore};
pub use identity::SelfInfo;
pub use locked::LockedJsonStore;
pub use nonce::NonceLog;
pub use paths::{sanitize_key, MeshPaths};
pub use queue_state::{QueueState, QueueStateStore};
pub use registry::RegistryStore;
pub use session::SessionStore;
