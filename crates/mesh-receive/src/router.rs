//! Inbound webhook surface.
//!
//! Exposes `POST /hooks/:hook` (the webhook every peer's send pipeline
//! targets) and `GET /api/status` (a lightweight liveness probe — no auth,
//! must never wake the host runtime).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mesh_audit::AuditLog;
use mesh_conversation::ConversationEngine;
use mesh_send::Sender;
use mesh_store::{MeshPaths, NonceLog, RegistryStore, SessionStore};
use mesh_types::{now_ms, AuditEntry, Envelope, EnvelopeType, SessionMessage, DEFAULT_RING_CAP};
use serde_json::{json, Value};

use crate::pending::PendingTable;
use crate::runtime::{HostRuntime, InboundRequest};
use crate::validate::{rejection_status, InboundValidator};

#[derive(Clone)]
pub struct ReceiveState {
    self_name: String,
    registry: RegistryStore,
    paths: MeshPaths,
    nonce_log: Arc<NonceLog>,
    sessions: SessionStore,
    conversations: Arc<ConversationEngine>,
    audit: Arc<AuditLog>,
    pending: Arc<PendingTable>,
    sender: Arc<Sender>,
    runtime: Arc<dyn HostRuntime>,
}

impl ReceiveState {
    pub fn new(
        self_name: impl Into<String>,
        paths: MeshPaths,
        sender: Arc<Sender>,
        runtime: Arc<dyn HostRuntime>,
    ) -> Result<Self, mesh_types::MeshError> {
        let self_name = self_name.into();
        Ok(ReceiveState {
            registry: RegistryStore::open(paths.registry(), self_name.clone()),
            nonce_log: Arc::new(NonceLog::open(paths.seen_nonces())?),
            sessions: SessionStore::new(paths.clone()),
            conversations: Arc::new(ConversationEngine::new(&paths)),
            audit: Arc::new(AuditLog::new(paths.audit_log())),
            pending: Arc::new(PendingTable::new()),
            self_name,
            paths,
            sender,
            runtime,
        })
    }

    pub fn pending(&self) -> &Arc<PendingTable> {
        &self.pending
    }

    async fn record_session_inbound(&self, session_key: &str, envelope: &Envelope) {
        let body_text = extract_text(&envelope.payload.body);
        let result = self.sessions.mutate(session_key, |record| {
            record.push(
                SessionMessage {
                    from: envelope.from.clone(),
                    body: body_text.clone(),
                    ts: now_ms(),
                },
                DEFAULT_RING_CAP,
                now_ms(),
            );
        });
        if let Err(e) = result {
            tracing::warn!("failed to record inbound session message for {session_key}: {e}");
        }
    }

    async fn audit(&self, envelope: &Envelope, status: &str) {
        let entry = AuditEntry {
            ts: now_ms(),
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            kind: envelope.kind,
            id: envelope.id.clone(),
            subject: envelope.payload.subject.clone(),
            body: envelope.payload.body.clone(),
            status: status.to_string(),
            correlation_id: envelope.correlation_id.clone(),
            conversation_id: envelope.conversation_id.clone(),
            reply_context: envelope.reply_context.clone(),
            signed: envelope.signature.is_some(),
            session: envelope.session.clone(),
        };
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!("audit log write failed: {e}");
        }
    }
}

pub fn router(state: ReceiveState) -> Router {
    Router::new()
        .route("/hooks/:hook", post(receive_hook))
        .route("/api/status", get(status))
        .with_state(state)
}

/// A lightweight, unauthenticated liveness probe that must never wake an
/// agent session.
async fn status(State(state): State<ReceiveState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "self": state.self_name}))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn extract_text(body: &Value) -> String {
    if let Some(s) = body.as_str() {
        return s.to_string();
    }
    if let Some(s) = body.get("text").and_then(Value::as_str) {
        return s.to_string();
    }
    body.to_string()
}

async fn receive_hook(
    State(state): State<ReceiveState>,
    Path(_hook): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(message) = body.get("message").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, "missing message field").into_response();
    };
    let session_key_hint = body
        .get("sessionKey")
        .and_then(Value::as_str)
        .map(str::to_string);

    let raw: Value = match serde_json::from_str(message) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "message is not valid JSON").into_response(),
    };

    // Non-MESH bodies pass through untouched.
    let protocol = raw.get("protocol").and_then(Value::as_str).unwrap_or("");
    if !protocol.starts_with("mesh/") {
        state.runtime.handle_bare_message(raw).await;
        return StatusCode::OK.into_response();
    }

    let envelope: Envelope = match serde_json::from_value(raw) {
        Ok(e) => e,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("malformed envelope: {e}")).into_response(),
    };
    if envelope.validate_shape().is_err() {
        return (StatusCode::BAD_REQUEST, "envelope fails shape invariants").into_response();
    }

    let expected_token = match state.registry.peer(&envelope.from) {
        Ok(peer) => peer.token,
        Err(_) => return (StatusCode::UNAUTHORIZED, "unknown sender").into_response(),
    };
    let authorized = extract_bearer(&headers)
        .map(|provided| mesh_crypto::tokens_equal(provided, &expected_token))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid bearer token").into_response();
    }

    // Step 2: TTL / signature / replay / relay-loop, in that order.
    let validator = InboundValidator::new(
        &state.registry,
        &state.paths,
        &state.nonce_log,
        &state.self_name,
    );
    if let Err(err) = validator.validate(&envelope, now_ms()) {
        state.audit(&envelope, &rejection_status(&err)).await;
        // A replayed nonce may still get a 2xx: re-dispatch (not the HTTP
        // ack) is what must not happen.
        if matches!(
            err,
            mesh_types::MeshError::ReplayDetected | mesh_types::MeshError::RelayLoop
        ) {
            return StatusCode::OK.into_response();
        }
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    }

    // If this node isn't the final recipient, it's only here because a
    // `relay` hint named it as the carrier for this one hop — forward on to
    // `relay.originalTo` and stop. Anything else addressed elsewhere is
    // misdirected and ignored rather than processed as our own.
    if envelope.to != state.self_name {
        let Some(relay) = &envelope.relay else {
            state.audit(&envelope, "rejected_misdirected").await;
            return StatusCode::OK.into_response();
        };
        if relay.via != state.self_name {
            state.audit(&envelope, "rejected_misdirected").await;
            return StatusCode::OK.into_response();
        }
        state.audit(&envelope, "relay_forwarded").await;
        return forward_relayed(&state, envelope).await;
    }

    // Step 5 happens ahead of dispatch here only for bookkeeping purposes;
    // it does not gate steps 3/4.
    let session_key = envelope
        .session
        .as_ref()
        .map(|s| s.key.clone())
        .or(session_key_hint);
    if let Some(key) = &session_key {
        state.record_session_inbound(key, &envelope).await;
    }

    match envelope.kind {
        EnvelopeType::Response => {
            if let Some(correlation_id) = envelope.correlation_id.clone() {
                state.pending.fire(&correlation_id, envelope.clone());
            }
            if let Some(conv_id) = &envelope.conversation_id {
                let body_text = extract_text(&envelope.payload.body);
                if let Err(e) = state
                    .conversations
                    .on_response(conv_id, &envelope.from, &body_text, now_ms())
                {
                    tracing::warn!("conversation response update failed for {conv_id}: {e}");
                }
            }
        }
        EnvelopeType::Request => {
            let request = InboundRequest {
                from: envelope.from.clone(),
                subject: envelope.payload.subject.clone(),
                body: envelope.payload.body.clone(),
                attachments: envelope.payload.attachments.clone(),
                reply_context: envelope.reply_context.clone(),
            };
            let response_body = state.runtime.handle_request(request).await;
            if let Some(reply_to) = &envelope.reply_to {
                let mut response = Envelope::builder(&state.self_name, &envelope.from, EnvelopeType::Response);
                response.correlation_id = Some(envelope.id.clone());
                response.reply_context = envelope.reply_context.clone();
                response.payload.subject = envelope.payload.subject.clone();
                response.payload.body = response_body;
                if let Err(e) = state
                    .sender
                    .deliver_to_url(&reply_to.url, &reply_to.token, &response)
                    .await
                {
                    tracing::warn!("failed to deliver response to {}: {e}", envelope.from);
                }
            }
        }
        EnvelopeType::Notification | EnvelopeType::Alert | EnvelopeType::Ack => {
            state.runtime.handle_notification(&envelope).await;
        }
    }

    state.audit(&envelope, "received").await;
    StatusCode::OK.into_response()
}

/// Carry a relayed envelope the rest of the way to `relay.originalTo`, in a
/// single best-effort attempt. This deliberately bypasses [`Sender::send`]'s
/// own retry/relay-fallback loop — relaying the relay would let the hop
/// chain grow past one, which the inbound relay-loop check exists to
/// prevent. The forwarded copy drops its own `relay` hint so the final
/// recipient sees a plain envelope.
async fn forward_relayed(state: &ReceiveState, envelope: Envelope) -> Response {
    let Some(original_to) = envelope.relay.as_ref().map(|r| r.original_to.clone()) else {
        return StatusCode::OK.into_response();
    };
    let peer = match state.registry.peer(&original_to) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("cannot forward relayed envelope to {original_to}: {e}");
            return StatusCode::OK.into_response();
        }
    };
    let mut forwarded = envelope;
    forwarded.relay = None;
    if let Err(e) = state
        .sender
        .deliver_once(&peer, &forwarded, &mesh_send::SendOptions::default())
        .await
    {
        tracing::warn!("relay forward to {original_to} failed: {e}");
    }
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mesh_types::{Peer, PeerRole};
    use tower::ServiceExt;

    struct EchoRuntime;

    #[async_trait::async_trait]
    impl HostRuntime for EchoRuntime {
        async fn handle_request(&self, request: InboundRequest) -> Value {
            json!({"echo": request.subject})
        }
    }

    fn test_state(dir: &std::path::Path) -> ReceiveState {
        let paths = MeshPaths::with_root(dir);
        let sender = Arc::new(Sender::new(paths.clone(), "agent-a", "127.0.0.1", 9000));
        let state = ReceiveState::new("agent-a", paths, sender, Arc::new(EchoRuntime)).unwrap();
        state
            .registry
            .upsert_peer(
                "agent-b",
                Peer {
                    ip: "127.0.0.1".into(),
                    port: 9001,
                    token: "tok".into(),
                    role: PeerRole::Peer,
                    hook_path: "/hooks/agent-a".into(),
                    signing: false,
                },
            )
            .unwrap();
        state
    }

    #[tokio::test]
    async fn status_requires_no_auth() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));
        let resp = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn notification_with_valid_token_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let mut envelope = Envelope::builder("agent-b", "agent-a", EnvelopeType::Notification);
        envelope.payload.subject = "ping".into();
        let body = json!({"message": serde_json::to_string(&envelope).unwrap()});

        let resp = app
            .oneshot(
                Request::post("/hooks/agent-a")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer tok")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_bearer_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let mut envelope = Envelope::builder("agent-b", "agent-a", EnvelopeType::Notification);
        envelope.payload.subject = "ping".into();
        let body = json!({"message": serde_json::to_string(&envelope).unwrap()});

        let resp = app
            .oneshot(
                Request::post("/hooks/agent-a")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer wrong")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bare_message_with_non_mesh_protocol_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));
        let body = json!({"message": serde_json::to_string(&json!({"protocol": "slack/1.0", "text": "hi"})).unwrap()});

        let resp = app
            .oneshot(
                Request::post("/hooks/agent-a")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_nonce_is_accepted_but_not_redispatched() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let mut envelope = Envelope::builder("agent-b", "agent-a", EnvelopeType::Notification);
        envelope.payload.subject = "ping".into();
        let body = json!({"message": serde_json::to_string(&envelope).unwrap()});
        let req = || {
            Request::post("/hooks/agent-a")
                .header("content-type", "application/json")
                .header("authorization", "Bearer tok")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap()
        };

        let first = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(req()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn envelope_addressed_elsewhere_without_relay_hint_is_acked_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let mut envelope = Envelope::builder("agent-b", "agent-d", EnvelopeType::Notification);
        envelope.payload.subject = "ping".into();
        let body = json!({"message": serde_json::to_string(&envelope).unwrap()});

        let resp = app
            .oneshot(
                Request::post("/hooks/agent-a")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer tok")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn relay_hint_not_naming_self_as_via_is_acked_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path()));

        let mut envelope = Envelope::builder("agent-b", "agent-d", EnvelopeType::Notification);
        envelope.payload.subject = "ping".into();
        envelope.relay = Some(mesh_types::RelayHint {
            from: "agent-b".into(),
            via: "agent-c".into(),
            original_to: "agent-d".into(),
        });
        let body = json!({"message": serde_json::to_string(&envelope).unwrap()});

        let resp = app
            .oneshot(
                Request::post("/hooks/agent-a")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer tok")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
