//! The host agent runtime seam: an external collaborator that actually
//! interprets message bodies. This trait is the interface the receive
//! pipeline dispatches across; the host process supplies the implementation.

use mesh_types::{Attachment, Envelope};
use serde_json::Value;

/// The structured fields handed to the host runtime for a `type=request`
/// envelope.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub from: String,
    pub subject: String,
    pub body: Value,
    pub attachments: Vec<Attachment>,
    pub reply_context: Option<Value>,
}

/// Implemented by whatever actually interprets message bodies (an LLM agent
/// loop, a scripted responder, a test double). Default methods make the
/// non-request paths optional for implementors that only care about
/// request/response traffic.
#[async_trait::async_trait]
pub trait HostRuntime: Send + Sync {
    /// Produce the response body for a `type=request` envelope. The receive
    /// pipeline wraps whatever this returns in a `response`-typed envelope
    /// and sends it.
    async fn handle_request(&self, request: InboundRequest) -> Value;

    /// A `notification`/`alert`/`ack` envelope arrived; no response is
    /// expected or sent.
    async fn handle_notification(&self, _envelope: &Envelope) {}

    /// A POST body whose `protocol` was not `mesh/*` — passed through
    /// unchanged for backward compatibility with non-MESH callers.
    async fn handle_bare_message(&self, _raw: Value) {}
}
