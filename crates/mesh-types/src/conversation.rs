//! Conversation and round records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Rally,
    Collab,
    Escalation,
    Broadcast,
    Opinion,
    Brainstorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    Active,
    Partial,
    Complete,
    Timeout,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Open,
    Complete,
    Superseded,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusVerdict {
    Match,
    NearMatch,
    Close,
    Disagree,
    Insufficient,
    NoData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    pub verdict: ConsensusVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancy: Option<f64>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub from: String,
    pub body: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round: u32,
    pub question: String,
    pub ts: i64,
    #[serde(default)]
    pub responses: Vec<ParticipantResponse>,
    pub status: RoundStatus,
    #[serde(rename = "expectedResponses")]
    pub expected_responses: usize,
    #[serde(rename = "receivedResponses")]
    pub received_responses: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: ConversationType,
    pub from: String,
    pub question: String,
    pub participants: Vec<String>,
    #[serde(rename = "expectedResponses")]
    pub expected_responses: usize,
    #[serde(rename = "receivedResponses")]
    pub received_responses: usize,
    #[serde(default)]
    pub responses: Vec<ParticipantResponse>,
    pub rounds: Vec<Round>,
    #[serde(rename = "currentRound")]
    pub current_round: u32,
    pub status: ConversationStatus,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    pub ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
}

impl ConversationRecord {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ConversationStatus::Complete
                | ConversationStatus::Timeout
                | ConversationStatus::Closed
                | ConversationStatus::Cancelled
        )
    }
}
