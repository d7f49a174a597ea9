//! Audit entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{EnvelopeType, SessionRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: i64,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub id: String,
    pub subject: String,
    pub body: Value,
    pub status: String,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(rename = "replyContext", skip_serializing_if = "Option::is_none")]
    pub reply_context: Option<Value>,
    pub signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRef>,
}
