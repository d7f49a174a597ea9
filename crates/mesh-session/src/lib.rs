//! Durable cross-peer sessions.

pub mod router;

pub use router::{SessionRouter, DEFAULT_SESSION_TTL_SECS};
