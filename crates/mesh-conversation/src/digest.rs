//! Shared-context digest builder.

use mesh_types::ConversationRecord;
use serde_json::{json, Value};

pub const DEFAULT_DIGEST_CHARS: usize = 2000;

/// A compact textual digest of prior rounds, trimmed to `max_chars`
/// favoring the most recent rounds.
pub fn build_digest(record: &ConversationRecord, max_chars: usize) -> String {
    let mut blocks = Vec::new();
    for round in record.rounds.iter().rev() {
        let mut block = format!("Round {}: {}\n", round.round, round.question);
        for resp in &round.responses {
            block.push_str(&format!("  {}: {}\n", resp.from, resp.body));
        }
        blocks.push(block);
    }

    let mut total = 0usize;
    let mut kept = Vec::new();
    for block in blocks {
        if total + block.len() > max_chars && !kept.is_empty() {
            break;
        }
        total += block.len();
        kept.push(block);
    }
    kept.reverse();
    kept.join("")
}

/// The machine-readable twin of [`build_digest`], attached via
/// `replyContext.priorRounds`.
pub fn prior_rounds_json(record: &ConversationRecord) -> Value {
    json!(record
        .rounds
        .iter()
        .map(|r| json!({
            "round": r.round,
            "question": r.question,
            "responses": r.responses,
        }))
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{ConversationStatus, ConversationType, ParticipantResponse, Round, RoundStatus};

    fn record_with_rounds(n: u32) -> ConversationRecord {
        let rounds = (1..=n)
            .map(|i| Round {
                round: i,
                question: format!("question {i}"),
                ts: 0,
                responses: vec![ParticipantResponse {
                    from: "agent-b".into(),
                    body: format!("answer {i}"),
                    ts: 0,
                }],
                status: RoundStatus::Complete,
                expected_responses: 1,
                received_responses: 1,
                consensus: None,
            })
            .collect();
        ConversationRecord {
            conversation_id: "conv_1".into(),
            kind: ConversationType::Collab,
            from: "agent-a".into(),
            question: "question 1".into(),
            participants: vec!["agent-b".into()],
            expected_responses: 1,
            received_responses: 1,
            responses: vec![],
            rounds,
            current_round: n,
            status: ConversationStatus::Active,
            created_at: 0,
            updated_at: 0,
            expires_at: 600_000,
            ttl: 600,
            summary: None,
            consensus: None,
        }
    }

    #[test]
    fn digest_includes_every_round_when_small() {
        let record = record_with_rounds(2);
        let digest = build_digest(&record, DEFAULT_DIGEST_CHARS);
        assert!(digest.contains("Round 1"));
        assert!(digest.contains("Round 2"));
    }

    #[test]
    fn digest_favors_recent_rounds_under_budget() {
        let record = record_with_rounds(3);
        let digest = build_digest(&record, 40);
        assert!(digest.contains("Round 3"));
        assert!(!digest.contains("Round 1"));
    }

    #[test]
    fn prior_rounds_json_carries_every_round() {
        let record = record_with_rounds(2);
        let value = prior_rounds_json(&record);
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
