//! The on-wire envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::MeshError;
use crate::time::{now_ms, to_iso8601_millis};

pub const PROTOCOL: &str = "mesh/3.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Request,
    Response,
    Notification,
    Alert,
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub url: String,
    pub token: String,
}

/// Carried on an envelope the sender couldn't deliver directly and instead
/// handed to a relay peer: `from` is the original sender, `via` the relay,
/// `originalTo` the intended final recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayHint {
    pub from: String,
    pub via: String,
    #[serde(rename = "originalTo")]
    pub original_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRef {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Url {
        url: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Inline {
        encoding: String,
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        size: u64,
    },
    Path {
        path: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub subject: String,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
}

/// The on-wire message unit. Field order matters for nothing at the Rust
/// level — the signature is computed over a canonical re-encoding, see
/// `mesh-crypto::canonical_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub protocol: String,
    pub id: String,
    pub timestamp: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "correlationId")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "parentMessageId")]
    pub parent_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "replyTo")]
    pub reply_to: Option<ReplyTo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "replyContext")]
    pub reply_context: Option<Value>,
    #[serde(default)]
    pub priority: Priority,
    pub ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: Option<String>,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRef>,
    /// Present when this envelope is riding a relay's fallback path rather
    /// than going straight to `to`. A relay receiving an envelope with this
    /// set forwards it on to `relay.originalTo` instead of treating `to` as
    /// itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayHint>,
    pub payload: Payload,
}

pub const DEFAULT_TTL_SECS: u64 = 300;

impl Envelope {
    /// Start building a request envelope. Call sites fill in `reply_to`
    /// themselves, since only the sender knows its own ip/port/token.
    pub fn builder(from: impl Into<String>, to: impl Into<String>, kind: EnvelopeType) -> Self {
        Envelope {
            protocol: PROTOCOL.to_string(),
            id: format!("msg_{}", Uuid::new_v4().simple()),
            timestamp: to_iso8601_millis(now_ms()),
            from: from.into(),
            to: to.into(),
            kind,
            correlation_id: None,
            conversation_id: None,
            parent_message_id: None,
            reply_to: None,
            reply_context: None,
            priority: Priority::Normal,
            ttl: DEFAULT_TTL_SECS,
            idempotency_key: None,
            nonce: new_nonce(),
            signature: None,
            session: None,
            relay: None,
            payload: Payload::default(),
        }
    }

    /// Invariant: every envelope carries these fields non-empty.
    pub fn validate_shape(&self) -> Result<(), MeshError> {
        if self.id.is_empty()
            || self.from.is_empty()
            || self.to.is_empty()
            || self.timestamp.is_empty()
            || self.payload.subject.is_empty()
        {
            return Err(MeshError::InvalidEnvelope(
                "id/from/to/timestamp/payload.subject must be non-empty".into(),
            ));
        }
        if self.nonce.is_empty() {
            return Err(MeshError::InvalidEnvelope("nonce must be non-empty".into()));
        }
        match self.kind {
            EnvelopeType::Response => {
                if self.correlation_id.as_deref().unwrap_or_default().is_empty() {
                    return Err(MeshError::InvalidEnvelope(
                        "response envelope requires correlationId".into(),
                    ));
                }
            }
            EnvelopeType::Request => {
                let Some(rt) = &self.reply_to else {
                    return Err(MeshError::InvalidEnvelope(
                        "request envelope requires replyTo".into(),
                    ));
                };
                if rt.token.is_empty() || !is_absolute_http_url(&rt.url) {
                    return Err(MeshError::InvalidEnvelope(
                        "replyTo.url must be an absolute http(s) URL and token non-empty".into(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn expires_at_ms(&self) -> i64 {
        crate::time::from_iso8601_millis(&self.timestamp).unwrap_or(0) + (self.ttl as i64) * 1000
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms() < now_ms
    }
}

fn is_absolute_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// A fresh per-message nonce. Uniqueness (not unpredictability) is the only
/// requirement for replay detection, so a UUIDv4 is sufficient here; actual
/// cryptographic randomness (OsRng) is reserved for `mesh-crypto`'s keys,
/// tokens, and IVs.
pub fn new_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}
