//! Multi-participant, multi-round conversations.

pub mod consensus;
pub mod defaults;
pub mod digest;
pub mod engine;

pub use consensus::{compute_consensus, parse_numeric_response};
pub use digest::{build_digest, prior_rounds_json, DEFAULT_DIGEST_CHARS};
pub use engine::ConversationEngine;
