//! Session record.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub from: String,
    pub body: String,
    pub ts: i64,
}

pub const DEFAULT_RING_CAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub created: i64,
    #[serde(rename = "lastActivity")]
    pub last_activity: i64,
    pub status: SessionStatus,
    pub participants: Vec<String>,
    pub messages: VecDeque<SessionMessage>,
}

impl SessionRecord {
    pub fn new(session_key: String, participants: Vec<String>, now_ms: i64) -> Self {
        SessionRecord {
            session_key,
            created: now_ms,
            last_activity: now_ms,
            status: SessionStatus::Active,
            participants,
            messages: VecDeque::new(),
        }
    }

    /// Push a message, evicting the oldest past `cap` — a bounded ring
    /// buffer over the session transcript.
    pub fn push(&mut self, msg: SessionMessage, cap: usize, now_ms: i64) {
        self.messages.push_back(msg);
        while self.messages.len() > cap {
            self.messages.pop_front();
        }
        self.last_activity = now_ms;
    }
}
