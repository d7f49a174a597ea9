//! Dead-letter record.

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub timestamp: i64,
    pub to: String,
    #[serde(rename = "failReason")]
    pub fail_reason: String,
    pub attempts: u32,
    pub envelope: Envelope,
}

pub const DEFAULT_MAX_QUEUE: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeadLetterQueue {
    pub entries: std::collections::VecDeque<DeadLetter>,
    #[serde(default)]
    pub dropped: u64,
}
