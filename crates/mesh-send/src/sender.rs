//! Envelope construction, signing, and dispatch to a peer.

use std::time::Duration;

use mesh_audit::AuditLog;
use mesh_breaker::{Admission, Breaker};
use mesh_crypto::encrypt_body;
use mesh_store::{CircuitStore, DeadLetterStore, MeshPaths, RegistryStore, RoutingStore, SessionStore};
use mesh_types::{
    now_ms, AuditEntry, DeadLetter, Envelope, EnvelopeType, MeshError, Payload, Peer, Priority,
    ReplyTo, SessionMessage, SessionRef, DEFAULT_RING_CAP,
};
use serde_json::{json, Value};

use crate::retry::RetryPolicy;

/// Everything a single `send` call can be told to carry beyond the bare
/// `(target, type, body)` triple.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub correlation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub reply_context: Option<Value>,
    pub priority: Priority,
    pub ttl: Option<u64>,
    pub session: Option<SessionRef>,
    pub metadata: Option<Value>,
    pub idempotency_key: Option<String>,
    /// `--encrypt`: when set, names the key scope under
    /// `config/encryption-keys/{scope}.key` to encrypt `payload.body` with
    /// before sending.
    pub encrypt_scope: Option<String>,
}

impl SendOptions {
    /// The `replyContext.sessionKey` routing hint, read out of whatever
    /// `reply_context` the caller supplied.
    fn session_key_hint(&self) -> Option<String> {
        self.reply_context
            .as_ref()
            .and_then(|v| v.get("sessionKey"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub sent: Vec<String>,
    pub failed: Vec<(String, MeshError)>,
}

pub struct Sender {
    self_name: String,
    self_ip: String,
    self_port: u16,
    paths: MeshPaths,
    registry: RegistryStore,
    circuit: CircuitStore,
    dead_letter: DeadLetterStore,
    routing: RoutingStore,
    sessions: SessionStore,
    audit: AuditLog,
    client: reqwest::Client,
    pub retry: RetryPolicy,
    /// Best-effort dashboard notification sink URL, if configured. A
    /// `None` disables the notification entirely.
    dashboard_sink: Option<String>,
}

impl Sender {
    pub fn new(
        paths: MeshPaths,
        self_name: impl Into<String>,
        self_ip: impl Into<String>,
        self_port: u16,
    ) -> Self {
        let self_name = self_name.into();
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client config is valid");
        Sender {
            registry: RegistryStore::open(paths.registry(), self_name.clone()),
            circuit: CircuitStore::open(paths.circuit_breakers()),
            dead_letter: DeadLetterStore::open(paths.dead_letters()),
            routing: RoutingStore::open(paths.routing_table()),
            sessions: SessionStore::new(paths.clone()),
            audit: AuditLog::new(paths.audit_log()),
            self_ip: self_ip.into(),
            self_port,
            self_name,
            paths,
            client,
            retry: RetryPolicy::default(),
            dashboard_sink: None,
        }
    }

    pub fn with_dashboard_sink(mut self, url: impl Into<String>) -> Self {
        self.dashboard_sink = Some(url.into());
        self
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn circuit(&self) -> &CircuitStore {
        &self.circuit
    }

    pub fn dead_letter(&self) -> &DeadLetterStore {
        &self.dead_letter
    }

    pub fn routing(&self) -> &RoutingStore {
        &self.routing
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Build the outbound envelope for one target, filling `replyTo` from
    /// self's own reachable address and attaching a signature if the target
    /// peer has `signing=true`.
    fn build_envelope(
        &self,
        target: &str,
        peer: &Peer,
        kind: EnvelopeType,
        subject: &str,
        body: Value,
        opts: &SendOptions,
    ) -> Result<Envelope, MeshError> {
        let mut envelope = Envelope::builder(&self.self_name, target, kind);
        envelope.correlation_id = opts.correlation_id.clone();
        envelope.conversation_id = opts.conversation_id.clone();
        envelope.parent_message_id = opts.parent_message_id.clone();
        envelope.reply_context = opts.reply_context.clone();
        envelope.priority = opts.priority;
        if let Some(ttl) = opts.ttl {
            envelope.ttl = ttl;
        }
        envelope.idempotency_key = opts.idempotency_key.clone();
        envelope.session = opts.session.clone();
        envelope.payload = Payload {
            subject: subject.to_string(),
            body,
            attachments: Vec::new(),
            metadata: opts.metadata.clone(),
            encrypted: false,
        };

        if matches!(kind, EnvelopeType::Request) {
            envelope.reply_to = Some(ReplyTo {
                url: format!(
                    "http://{}:{}/hooks/{target}",
                    self.self_ip, self.self_port
                ),
                token: peer.token.clone(),
            });
        }

        if peer.signing {
            let key_path = self.paths.signing_key(target);
            let key = mesh_store::keys::load_signing_key(&key_path)
                .map_err(|e| MeshError::Store(e.to_string()))?
                .ok_or_else(|| {
                    MeshError::EncryptionFailure(format!("no signing key on file for {target}"))
                })?;
            mesh_crypto::attach_signature(&key, &mut envelope);
        }

        envelope.validate_shape()?;
        Ok(envelope)
    }

    /// Optionally replace `payload.body` with its encrypted wrapper using
    /// the scope-shared encryption key (`--encrypt`).
    fn maybe_encrypt(&self, envelope: &mut Envelope, scope: &str) -> Result<(), MeshError> {
        let key_path = self.paths.encryption_key(scope);
        let Some(key) = mesh_store::keys::load_encryption_key(&key_path)
            .map_err(|e| MeshError::Store(e.to_string()))?
        else {
            return Err(MeshError::EncryptionFailure(format!(
                "no encryption key on file for scope {scope}"
            )));
        };
        let plaintext = serde_json::to_vec(&envelope.payload.body)
            .map_err(|e| MeshError::EncryptionFailure(e.to_string()))?;
        envelope.payload.body = encrypt_body(&key, &plaintext);
        envelope.payload.encrypted = true;
        // Signed envelopes sign over the final (encrypted) body, so
        // re-sign after replacing it.
        if envelope.signature.is_some() {
            let target = envelope.to.clone();
            let key_path = self.paths.signing_key(&target);
            if let Some(signing_key) = mesh_store::keys::load_signing_key(&key_path)
                .map_err(|e| MeshError::Store(e.to_string()))?
            {
                mesh_crypto::attach_signature(&signing_key, envelope);
            }
        }
        Ok(())
    }

    /// Decide the POST URL and body for one target.
    fn request_shape(&self, peer: &Peer, envelope: &Envelope, opts: &SendOptions) -> (String, Value) {
        if let Some(session_key) = opts.session_key_hint() {
            let url = format!("{}/hooks/agent", peer.base_url());
            let body = json!({
                "message": serde_json::to_string(envelope).expect("envelope serializes"),
                "sessionKey": session_key,
            });
            (url, body)
        } else {
            let url = peer.hook_url(&self.self_name);
            let body = json!({
                "message": serde_json::to_string(envelope).expect("envelope serializes"),
            });
            (url, body)
        }
    }

    /// A single HTTP attempt with no retry logic of its own — shared by the
    /// retry loop in [`Sender::send`] and the queue drainer's replay path.
    pub async fn deliver_once(
        &self,
        peer: &Peer,
        envelope: &Envelope,
        opts: &SendOptions,
    ) -> Result<(), MeshError> {
        let (url, body) = self.request_shape(peer, envelope, opts);
        let mut req = self.client.post(&url).json(&body).bearer_auth(&peer.token);
        if let Some(sig) = &envelope.signature {
            req = req.header("X-MESH-Signature", sig);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| MeshError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_client_error() {
            return Err(MeshError::ClientError {
                peer: envelope.to.clone(),
                code: status.as_u16(),
            });
        }
        Err(MeshError::Transport(format!("http {status}")))
    }

    /// Deliver an already-built envelope straight to a literal URL with a
    /// literal bearer token, bypassing registry lookup entirely. Used by the
    /// receive pipeline to answer a `request` via the `replyTo` the original
    /// sender handed us, which may not match anything in our own registry.
    pub async fn deliver_to_url(
        &self,
        url: &str,
        token: &str,
        envelope: &Envelope,
    ) -> Result<(), MeshError> {
        let body = json!({
            "message": serde_json::to_string(envelope).expect("envelope serializes"),
        });
        let mut req = self.client.post(url).json(&body).bearer_auth(token);
        if let Some(sig) = &envelope.signature {
            req = req.header("X-MESH-Signature", sig);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| MeshError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(MeshError::Transport(format!("http {}", resp.status())))
    }

    /// Best-effort relay fallback.
    async fn try_relay(&self, envelope: &Envelope, opts: &SendOptions) -> Result<String, MeshError> {
        let routing = self.routing.get()?;
        let Some(relay_name) = routing.relay.clone() else {
            return Err(MeshError::Transport("no relay configured".into()));
        };
        if relay_name == envelope.to || relay_name == self.self_name {
            return Err(MeshError::Transport("relay is not distinct from target/self".into()));
        }
        let relay_peer = self.registry.peer(&relay_name)?;

        let mut relayed = envelope.clone();
        relayed.relay = Some(mesh_types::RelayHint {
            from: self.self_name.clone(),
            via: relay_name.clone(),
            original_to: envelope.to.clone(),
        });

        self.deliver_once(&relay_peer, &relayed, opts).await?;
        Ok(format!("relayed_via_{relay_name}"))
    }

    async fn notify_dashboard(&self, envelope: &Envelope) {
        let Some(sink) = &self.dashboard_sink else {
            return;
        };
        let sink = sink.clone();
        let id = envelope.id.clone();
        let from = envelope.from.clone();
        let to = envelope.to.clone();
        tokio::spawn(async move {
            let body = json!({"id": id, "from": from, "to": to});
            let res = reqwest::Client::new()
                .post(&sink)
                .json(&body)
                .timeout(Duration::from_secs(3))
                .send()
                .await;
            if let Err(e) = res {
                tracing::debug!("dashboard notification failed (ignored): {e}");
            }
        });
    }

    async fn record_session_send(&self, envelope: &Envelope) {
        let Some(session) = &envelope.session else {
            return;
        };
        let body_text = envelope
            .payload
            .body
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| envelope.payload.body.to_string());
        let key = session.key.clone();
        let result = self.sessions.mutate(&key, |record| {
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
            tracing::warn!("failed to record session send for {key}: {e}");
        }
    }

    async fn audit_outcome(&self, envelope: &Envelope, status: &str) {
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

    fn dead_letter_entry(&self, envelope: Envelope, attempts: u32, reason: impl Into<String>) {
        let entry = DeadLetter {
            id: envelope.id.clone(),
            timestamp: now_ms(),
            to: envelope.to.clone(),
            fail_reason: reason.into(),
            attempts,
            envelope,
        };
        match self.dead_letter.push(entry) {
            Ok(true) => tracing::warn!("dead-letter queue overflow, oldest entry dropped"),
            Ok(false) => {}
            Err(e) => tracing::warn!("failed to persist dead-letter entry: {e}"),
        }
    }

    /// Send to one target: build, sign, dispatch, retry, and relay-fallback.
    pub async fn send(
        &self,
        target: &str,
        kind: EnvelopeType,
        subject: &str,
        body: Value,
        opts: SendOptions,
    ) -> Result<String, MeshError> {
        let peer = self.registry.peer(target)?;

        let breaker = Breaker::new(&self.circuit);
        let admission = breaker.admit(target, now_ms())?;
        let mut envelope = self.build_envelope(target, &peer, kind, subject, body, &opts)?;
        if let Some(scope) = &opts.encrypt_scope {
            self.maybe_encrypt(&mut envelope, scope)?;
        }
        let envelope = envelope;

        if admission == Admission::Deny {
            self.dead_letter_entry(envelope.clone(), 0, "circuit_open");
            self.audit_outcome(&envelope, "rejected_circuit_open").await;
            return Err(MeshError::CircuitOpen(target.to_string()));
        }

        let deadline_ms = envelope.expires_at_ms();
        let mut last_err = MeshError::Transport("no attempt made".into());

        for attempt in 0..self.retry.attempts() {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay(attempt)).await;
            }
            if now_ms() > deadline_ms {
                last_err = MeshError::Expired;
                break;
            }

            match self.deliver_once(&peer, &envelope, &opts).await {
                Ok(()) => {
                    breaker.record_success(target)?;
                    self.audit_outcome(&envelope, "sent").await;
                    self.notify_dashboard(&envelope).await;
                    self.record_session_send(&envelope).await;
                    return Ok(envelope.id);
                }
                Err(err @ MeshError::ClientError { .. }) => {
                    breaker.record_failure(target, now_ms())?;
                    self.dead_letter_entry(envelope.clone(), (attempt + 1) as u32, err.reason_tag());
                    self.audit_outcome(&envelope, &err.reason_tag()).await;
                    return Err(err);
                }
                Err(err) => {
                    last_err = err;
                }
            }
        }

        breaker.record_failure(target, now_ms())?;

        if let Ok(relayed_reason) = self.try_relay(&envelope, &opts).await {
            breaker.record_success(target)?;
            self.audit_outcome(&envelope, &relayed_reason).await;
            self.notify_dashboard(&envelope).await;
            self.record_session_send(&envelope).await;
            return Ok(envelope.id);
        }

        self.dead_letter_entry(
            envelope.clone(),
            self.retry.attempts() as u32,
            last_err.reason_tag(),
        );
        self.audit_outcome(&envelope, &last_err.reason_tag()).await;
        Err(last_err)
    }

    /// Fan out the same `(type, subject, body)` to every target
    /// independently, collecting successes and failures.
    pub async fn broadcast(
        &self,
        targets: &[String],
        kind: EnvelopeType,
        subject: &str,
        body: Value,
        opts: SendOptions,
    ) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        for target in targets {
            match self
                .send(target, kind, subject, body.clone(), opts.clone())
                .await
            {
                Ok(id) => outcome.sent.push(id),
                Err(e) => outcome.failed.push((target.clone(), e)),
            }
        }
        outcome
    }
}
