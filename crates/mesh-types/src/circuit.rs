//! Circuit breaker record.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub state: CircuitState,
    pub failures: u32,
    #[serde(rename = "lastFailure", skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<i64>,
    #[serde(rename = "openUntil", skip_serializing_if = "Option::is_none")]
    pub open_until: Option<i64>,
}

impl Default for CircuitRecord {
    fn default() -> Self {
        CircuitRecord {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            open_until: None,
        }
    }
}
