//! Multi-participant, multi-round conversations: open, respond, complete, close, cancel, sweep.

use mesh_audit::AuditLog;
use mesh_send::{BroadcastOutcome, SendOptions, Sender};
use mesh_store::{ConversationStore, MeshPaths};
use mesh_types::{
    now_ms, AuditEntry, Consensus, ConsensusVerdict, ConversationRecord, ConversationStatus,
    ConversationType, EnvelopeType, MeshError, ParticipantResponse, Round, RoundStatus,
};
use serde_json::json;
use uuid::Uuid;

use crate::consensus::compute_consensus;
use crate::defaults::{defaults_for, preamble_for};
use crate::digest::{build_digest, prior_rounds_json, DEFAULT_DIGEST_CHARS};

pub struct ConversationEngine {
    store: ConversationStore,
    audit: AuditLog,
}

impl ConversationEngine {
    pub fn new(paths: &MeshPaths) -> Self {
        ConversationEngine {
            store: ConversationStore::new(paths.clone()),
            audit: AuditLog::new(paths.audit_log()),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    fn new_id() -> String {
        format!("conv_{}", Uuid::new_v4().simple())
    }

    async fn audit_transition(&self, conv_id: &str, from: &str, status: &str, reason: Option<&str>) {
        let entry = AuditEntry {
            ts: now_ms(),
            from: from.to_string(),
            to: conv_id.to_string(),
            kind: EnvelopeType::Notification,
            id: conv_id.to_string(),
            subject: "conversation_transition".into(),
            body: json!({"reason": reason}),
            status: status.to_string(),
            correlation_id: None,
            conversation_id: Some(conv_id.to_string()),
            reply_context: None,
            signed: false,
            session: None,
        };
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!("audit log write failed: {e}");
        }
    }

    /// Create a conversation and fan round 1 out to every participant.
    pub async fn open_rally(
        &self,
        sender: &Sender,
        from: &str,
        kind: ConversationType,
        question: &str,
        participants: &[String],
        ack: bool,
        now: i64,
    ) -> Result<(String, BroadcastOutcome), MeshError> {
        let conv_id = Self::new_id();
        let (mut ttl, priority, mut expected) = defaults_for(kind, participants.len());
        let mut envelope_kind = EnvelopeType::Request;
        if matches!(kind, ConversationType::Broadcast) {
            envelope_kind = EnvelopeType::Notification;
            if ack {
                ttl = 60;
                expected = participants.len();
                envelope_kind = EnvelopeType::Request;
            }
        }

        let round = Round {
            round: 1,
            question: question.to_string(),
            ts: now,
            responses: Vec::new(),
            status: RoundStatus::Open,
            expected_responses: expected,
            received_responses: 0,
            consensus: None,
        };
        let record = ConversationRecord {
            conversation_id: conv_id.clone(),
            kind,
            from: from.to_string(),
            question: question.to_string(),
            participants: participants.to_vec(),
            expected_responses: expected,
            received_responses: 0,
            responses: Vec::new(),
            rounds: vec![round],
            current_round: 1,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now + (ttl as i64) * 1000,
            ttl,
            summary: None,
            consensus: None,
        };
        self.store.save(&record)?;

        let body = preamble_for(kind, question);
        let reply_context = json!({
            "conversationId": conv_id,
            "participants": participants,
            "round": 1,
        });
        let opts = SendOptions {
            conversation_id: Some(conv_id.clone()),
            reply_context: Some(reply_context),
            priority,
            ttl: Some(ttl),
            ..Default::default()
        };
        let outcome = sender
            .broadcast(participants, envelope_kind, "conversation", json!({"text": body}), opts)
            .await;
        Ok((conv_id, outcome))
    }

    /// Close the current round as `superseded` if still open, append a new
    /// round, and re-fan with shared prior-round context.
    pub async fn follow_up(
        &self,
        sender: &Sender,
        conv_id: &str,
        question: &str,
        now: i64,
    ) -> Result<(u32, BroadcastOutcome), MeshError> {
        let Some(existing) = self.store.get(conv_id)? else {
            return Err(MeshError::InvalidEnvelope(format!(
                "unknown conversation {conv_id}"
            )));
        };
        let new_round_num = existing.current_round + 1;
        let participants = existing.participants.clone();
        let expected = participants.len();
        let kind = existing.kind;

        let updated = self.store.mutate(conv_id, |r| {
            let current = r.current_round;
            if let Some(round) = r.rounds.iter_mut().find(|rd| rd.round == current) {
                if round.status == RoundStatus::Open {
                    round.status = RoundStatus::Superseded;
                }
            }
            r.rounds.push(Round {
                round: new_round_num,
                question: question.to_string(),
                ts: now,
                responses: Vec::new(),
                status: RoundStatus::Open,
                expected_responses: expected,
                received_responses: 0,
                consensus: None,
            });
            r.current_round = new_round_num;
            r.status = ConversationStatus::Active;
            r.updated_at = now;
        })?;
        let updated = updated.unwrap_or(existing);

        let digest = build_digest(&updated, DEFAULT_DIGEST_CHARS);
        let prior_rounds = prior_rounds_json(&updated);
        let reply_context = json!({
            "conversationId": conv_id,
            "participants": participants,
            "round": new_round_num,
            "priorRounds": prior_rounds,
        });
        let envelope_kind = if matches!(kind, ConversationType::Broadcast) {
            EnvelopeType::Notification
        } else {
            EnvelopeType::Request
        };
        let body = json!({"text": format!("{digest}\n\n{question}")});
        let opts = SendOptions {
            conversation_id: Some(conv_id.to_string()),
            reply_context: Some(reply_context),
            ..Default::default()
        };
        let outcome = sender
            .broadcast(&participants, envelope_kind, "conversation", body, opts)
            .await;
        Ok((new_round_num, outcome))
    }

    /// Append a response to the current round (deduplicated by `from`); mark
    /// the round complete once `expectedResponses` is reached, and the
    /// conversation complete once every round is resolved.
    pub fn on_response(
        &self,
        conv_id: &str,
        from: &str,
        body: &str,
        now: i64,
    ) -> Result<Option<ConversationRecord>, MeshError> {
        self.store.mutate(conv_id, |r| {
            let current = r.current_round;
            r.updated_at = now;
            let Some(round) = r.rounds.iter_mut().find(|rd| rd.round == current) else {
                return;
            };
            if round.responses.iter().any(|resp| resp.from == from) {
                return;
            }
            let response = ParticipantResponse {
                from: from.to_string(),
                body: body.to_string(),
                ts: now,
            };
            round.responses.push(response.clone());
            round.received_responses = round.responses.len();
            r.responses.push(response);
            r.received_responses = r.responses.len();

            if round.received_responses >= round.expected_responses {
                round.status = RoundStatus::Complete;
            }
            if r.rounds.iter().all(|rd| rd.status != RoundStatus::Open) {
                r.status = ConversationStatus::Complete;
            } else if !r.rounds.is_empty() {
                r.status = ConversationStatus::Partial;
            }
        })
    }

    pub async fn complete(&self, conv_id: &str, summary: Option<String>, now: i64) -> Result<(), MeshError> {
        self.store.mutate(conv_id, |r| {
            r.status = ConversationStatus::Complete;
            r.summary = summary.clone();
            r.updated_at = now;
        })?;
        self.audit_transition(conv_id, "system", "conversation_complete", summary.as_deref())
            .await;
        Ok(())
    }

    pub async fn close(&self, conv_id: &str, reason: &str, now: i64) -> Result<(), MeshError> {
        self.store.mutate(conv_id, |r| {
            r.status = ConversationStatus::Closed;
            r.summary = Some(reason.to_string());
            r.updated_at = now;
        })?;
        self.audit_transition(conv_id, "system", "conversation_closed", Some(reason))
            .await;
        Ok(())
    }

    pub async fn cancel(&self, conv_id: &str, reason: &str, now: i64) -> Result<(), MeshError> {
        self.store.mutate(conv_id, |r| {
            r.status = ConversationStatus::Cancelled;
            r.summary = Some(reason.to_string());
            r.updated_at = now;
        })?;
        self.audit_transition(conv_id, "system", "conversation_cancelled", Some(reason))
            .await;
        Ok(())
    }

    /// Pure function shared by the CLI `conversation timeout` verb and the
    /// daemon's scheduled sweep.
    pub fn timeout_sweep_pure(now: i64, records: &[ConversationRecord]) -> Vec<String> {
        records
            .iter()
            .filter(|r| !r.is_terminal() && r.expires_at < now)
            .map(|r| r.conversation_id.clone())
            .collect()
    }

    pub async fn timeout_sweep(&self, now: i64) -> Result<Vec<String>, MeshError> {
        let records = self.store.list_all()?;
        let timed_out = Self::timeout_sweep_pure(now, &records);
        for id in &timed_out {
            self.store.mutate(id, |r| {
                r.status = ConversationStatus::Timeout;
                r.updated_at = now;
            })?;
            self.audit_transition(id, "system", "conversation_timeout", None).await;
        }
        Ok(timed_out)
    }

    /// Computes the consensus verdict for a round, defaulting to the
    /// current round when `round` is omitted.
    pub fn consensus(&self, conv_id: &str, round: Option<u32>) -> Result<Consensus, MeshError> {
        let Some(record) = self.store.get(conv_id)? else {
            return Err(MeshError::InvalidEnvelope(format!(
                "unknown conversation {conv_id}"
            )));
        };
        let target_round = round.unwrap_or(record.current_round);
        let Some(round_data) = record.rounds.iter().find(|r| r.round == target_round) else {
            return Ok(Consensus {
                verdict: ConsensusVerdict::NoData,
                discrepancy: None,
                values: vec![],
            });
        };
        let result = compute_consensus(&round_data.responses);

        self.store.mutate(conv_id, |r| {
            if let Some(rd) = r.rounds.iter_mut().find(|rd| rd.round == target_round) {
                rd.consensus = Some(result.clone());
            }
            if target_round == r.current_round {
                r.consensus = Some(result.clone());
            }
        })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::MeshPaths;
    use mesh_types::PeerRole;

    fn sender(dir: &std::path::Path) -> Sender {
        let paths = MeshPaths::with_root(dir);
        let mut sender = Sender::new(paths, "agent-a", "127.0.0.1", 9000);
        sender.retry = mesh_send::RetryPolicy { delays: vec![0] };
        sender
            .registry()
            .upsert_peer(
                "agent-b",
                mesh_types::Peer {
                    ip: "127.0.0.1".into(),
                    port: 1,
                    token: "tok".into(),
                    role: PeerRole::Peer,
                    hook_path: "/hooks/agent-b".into(),
                    signing: false,
                },
            )
            .unwrap();
        sender
    }

    #[tokio::test]
    async fn open_rally_persists_round_one_with_expected_responses() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConversationEngine::new(&MeshPaths::with_root(dir.path()));
        let sender = sender(dir.path());
        let (conv_id, _) = engine
            .open_rally(
                &sender,
                "agent-a",
                ConversationType::Rally,
                "how many tanks?",
                &["agent-b".to_string()],
                false,
                0,
            )
            .await
            .unwrap();

        let record = engine.store().get(&conv_id).unwrap().unwrap();
        assert_eq!(record.rounds.len(), 1);
        assert_eq!(record.rounds[0].expected_responses, 1);
        assert_eq!(record.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn on_response_completes_round_and_conversation_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConversationEngine::new(&MeshPaths::with_root(dir.path()));
        let sender = sender(dir.path());
        let (conv_id, _) = engine
            .open_rally(
                &sender,
                "agent-a",
                ConversationType::Rally,
                "how many tanks?",
                &["agent-b".to_string()],
                false,
                0,
            )
            .await
            .unwrap();

        let record = engine.on_response(&conv_id, "agent-b", "12", 10).unwrap().unwrap();
        assert_eq!(record.status, ConversationStatus::Complete);
        assert_eq!(record.rounds[0].status, RoundStatus::Complete);
    }

    #[tokio::test]
    async fn duplicate_response_from_same_participant_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConversationEngine::new(&MeshPaths::with_root(dir.path()));
        let sender = sender(dir.path());
        let (conv_id, _) = engine
            .open_rally(
                &sender,
                "agent-a",
                ConversationType::Rally,
                "q",
                &["agent-b".to_string(), "agent-c".to_string()],
                false,
                0,
            )
            .await
            .unwrap();

        engine.on_response(&conv_id, "agent-b", "1", 1).unwrap();
        let record = engine.on_response(&conv_id, "agent-b", "2", 2).unwrap().unwrap();
        assert_eq!(record.received_responses, 1);
    }

    #[test]
    fn timeout_sweep_pure_only_flags_expired_non_terminal_records() {
        let mut record = mesh_types::ConversationRecord {
            conversation_id: "conv_1".into(),
            kind: ConversationType::Rally,
            from: "agent-a".into(),
            question: "q".into(),
            participants: vec!["agent-b".into()],
            expected_responses: 1,
            received_responses: 0,
            responses: vec![],
            rounds: vec![],
            current_round: 1,
            status: ConversationStatus::Active,
            created_at: 0,
            updated_at: 0,
            expires_at: 100,
            ttl: 0,
            summary: None,
            consensus: None,
        };
        let flagged = ConversationEngine::timeout_sweep_pure(200, std::slice::from_ref(&record));
        assert_eq!(flagged, vec!["conv_1".to_string()]);

        record.status = ConversationStatus::Complete;
        let flagged = ConversationEngine::timeout_sweep_pure(200, &[record]);
        assert!(flagged.is_empty());
    }
}
