//! Per-type defaults and preambles.

use mesh_types::{ConversationType, Priority};

/// `(ttl_secs, priority, expected_responses)` for a fresh rally in a
/// conversation of the given type and participant count.
pub fn defaults_for(kind: ConversationType, participants: usize) -> (u64, Priority, usize) {
    match kind {
        ConversationType::Rally => (300, Priority::Normal, participants),
        ConversationType::Collab => (600, Priority::Normal, participants),
        ConversationType::Escalation => (300, Priority::High, participants),
        ConversationType::Broadcast => (300, Priority::Normal, 0),
        ConversationType::Opinion => (300, Priority::Normal, participants),
        ConversationType::Brainstorm => (3600, Priority::Normal, participants),
    }
}

pub fn preamble_for(kind: ConversationType, question: &str) -> String {
    match kind {
        ConversationType::Collab => format!("[collab — multi-turn] {question}"),
        ConversationType::Escalation => format!("[escalation] {question}"),
        ConversationType::Broadcast => format!("[broadcast] {question}"),
        ConversationType::Brainstorm => format!("[brainstorm] {question}"),
        ConversationType::Opinion => format!("[opinion] {question}"),
        ConversationType::Rally => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_expects_no_responses_by_default() {
        let (_, _, expected) = defaults_for(ConversationType::Broadcast, 3);
        assert_eq!(expected, 0);
    }

    #[test]
    fn escalation_defaults_to_high_priority() {
        let (_, priority, _) = defaults_for(ConversationType::Escalation, 3);
        assert_eq!(priority, Priority::High);
    }
}
