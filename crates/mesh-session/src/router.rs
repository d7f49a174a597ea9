//! Durable cross-peer session creation, lookup, and expiry sweep.

use mesh_send::{BroadcastOutcome, SendOptions, Sender};
use mesh_store::SessionStore;
use mesh_types::{
    EnvelopeType, MeshError, SessionMessage, SessionRecord, SessionRef, SessionStatus,
    DEFAULT_RING_CAP,
};
use serde_json::json;

pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 3600;

pub struct SessionRouter<'a> {
    store: &'a SessionStore,
}

impl<'a> SessionRouter<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        SessionRouter { store }
    }

    /// Initialize a session file on first sight of `session_key`.
    pub fn ensure_session(
        &self,
        session_key: &str,
        participants: &[String],
        now_ms: i64,
    ) -> Result<SessionRecord, MeshError> {
        if let Some(existing) = self.store.get(session_key)? {
            return Ok(existing);
        }
        let record = SessionRecord::new(session_key.to_string(), participants.to_vec(), now_ms);
        self.store.save(&record)?;
        Ok(record)
    }

    /// Append an inbound envelope's text to the session ring.
    pub fn record_inbound(
        &self,
        session_key: &str,
        from: &str,
        body: &str,
        now_ms: i64,
    ) -> Result<(), MeshError> {
        self.store.mutate(session_key, |record| {
            record.push(
                SessionMessage {
                    from: from.to_string(),
                    body: body.to_string(),
                    ts: now_ms,
                },
                DEFAULT_RING_CAP,
                now_ms,
            );
        })?;
        Ok(())
    }

    /// A human-readable transcript for the host agent to consume.
    pub fn context_block(&self, session_key: &str) -> Result<String, MeshError> {
        let Some(record) = self.store.get(session_key)? else {
            return Ok(String::new());
        };
        Ok(render_context(&record))
    }

    /// Fan out `body` to every other participant, embedding both the
    /// human-readable transcript and the structured
    /// `metadata.sessionContext`.
    pub async fn send(
        &self,
        sender: &Sender,
        session_key: &str,
        from: &str,
        body: &str,
    ) -> Result<BroadcastOutcome, MeshError> {
        let Some(record) = self.store.get(session_key)? else {
            return Err(MeshError::InvalidEnvelope(format!(
                "unknown session {session_key}"
            )));
        };

        let targets: Vec<String> = record
            .participants
            .iter()
            .filter(|p| p.as_str() != from)
            .cloned()
            .collect();

        let context_block = render_context(&record);
        let enriched_body = json!({
            "text": body,
            "priorContext": context_block,
        });
        let opts = SendOptions {
            session: Some(SessionRef {
                key: session_key.to_string(),
                label: None,
                user: None,
            }),
            metadata: Some(json!({"sessionContext": record.messages})),
            ..Default::default()
        };

        Ok(sender
            .broadcast(
                &targets,
                EnvelopeType::Notification,
                "session_message",
                enriched_body,
                opts,
            )
            .await)
    }

    /// Close sessions inactive beyond `ttl_secs` (default 24h), returning
    /// the keys that transitioned to `closed` this sweep.
    pub fn sweep_expired(&self, now_ms: i64, ttl_secs: i64) -> Result<Vec<String>, MeshError> {
        let mut closed = Vec::new();
        for key in self.store.list_keys()? {
            let was_active = matches!(
                self.store.get(&key)?,
                Some(r) if r.status == SessionStatus::Active
            );
            if !was_active {
                continue;
            }
            let record = self.store.mutate(&key, |r| {
                if now_ms - r.last_activity > ttl_secs * 1000 {
                    r.status = SessionStatus::Closed;
                }
            })?;
            if matches!(record, Some(r) if r.status == SessionStatus::Closed) {
                closed.push(key);
            }
        }
        Ok(closed)
    }
}

fn render_context(record: &SessionRecord) -> String {
    record
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.from, m.body))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::MeshPaths;

    fn store(dir: &std::path::Path) -> SessionStore {
        SessionStore::new(MeshPaths::with_root(dir))
    }

    #[test]
    fn ensure_session_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let router = SessionRouter::new(&store);
        let first = router
            .ensure_session("room/1", &["a".into(), "b".into()], 0)
            .unwrap();
        assert_eq!(first.participants.len(), 2);

        router.record_inbound("room/1", "a", "hello", 1).unwrap();
        let second = router
            .ensure_session("room/1", &["a".into(), "b".into(), "c".into()], 2)
            .unwrap();
        assert_eq!(second.participants.len(), 2);
        assert_eq!(second.messages.len(), 1);
    }

    #[test]
    fn context_block_renders_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let router = SessionRouter::new(&store);
        router.ensure_session("room/1", &["a".into()], 0).unwrap();
        router.record_inbound("room/1", "a", "hi", 1).unwrap();
        router.record_inbound("room/1", "b", "hey", 2).unwrap();

        let block = router.context_block("room/1").unwrap();
        assert_eq!(block, "a: hi\nb: hey");
    }

    #[test]
    fn sweep_closes_only_stale_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let router = SessionRouter::new(&store);
        router.ensure_session("fresh", &["a".into()], 100_000).unwrap();
        router.ensure_session("stale", &["a".into()], 0).unwrap();

        let closed = router.sweep_expired(100_000 + 24 * 3600 * 1000 + 1, 24 * 3600).unwrap();
        assert_eq!(closed, vec!["stale".to_string()]);
    }
}
