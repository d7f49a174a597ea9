//! Inbound webhook handling: validation, correlation, and dispatch.

pub mod pending;
pub mod router;
pub mod runtime;
pub mod validate;

pub use pending::PendingTable;
pub use router::{router, ReceiveState};
pub use runtime::{HostRuntime, InboundRequest};
pub use validate::{rejection_status, InboundValidator};
