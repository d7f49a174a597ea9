//! Inbound envelope validation.
//!
//! Order matters: TTL first (cheapest check, no crypto/IO), then signature,
//! then nonce/replay (which mutates the nonce log on success).

use mesh_store::{MeshPaths, NonceLog, RegistryStore};
use mesh_types::{Envelope, MeshError};

/// Replay-window and clock-skew tolerances.
pub const DEFAULT_REPLAY_WINDOW_SECS: i64 = 300;
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 60;

pub struct InboundValidator<'a> {
    pub registry: &'a RegistryStore,
    pub paths: &'a MeshPaths,
    pub nonce_log: &'a NonceLog,
    pub replay_window_secs: i64,
    pub self_name: &'a str,
}

impl<'a> InboundValidator<'a> {
    pub fn new(
        registry: &'a RegistryStore,
        paths: &'a MeshPaths,
        nonce_log: &'a NonceLog,
        self_name: &'a str,
    ) -> Self {
        InboundValidator {
            registry,
            paths,
            nonce_log,
            replay_window_secs: DEFAULT_REPLAY_WINDOW_SECS,
            self_name,
        }
    }

    /// Runs the full TTL → signature → replay → relay-loop check, recording
    /// the nonce as seen on success. Returns the first violated check.
    pub fn validate(&self, envelope: &Envelope, now: i64) -> Result<(), MeshError> {
        if envelope.is_expired_at(now) {
            return Err(MeshError::Expired);
        }
        self.check_signature(envelope)?;
        self.check_replay(envelope, now)?;
        self.check_relay_loop(envelope)?;
        Ok(())
    }

    /// Rejects an envelope whose `relay` hint reflects back onto this node:
    /// addressed to us while also naming us as the relay that's meant to
    /// carry it further (`relay.via == self`), or originated from us
    /// (`relay.from == self`) — either shape means a hop already passed
    /// through this node once and a correct implementation must not let it
    /// pass through again. Since the wire format carries at most one `relay`
    /// hint (no hop counter), this is how "hop count exceeds one" is
    /// enforced: a relay only ever forwards once, never re-wrapping.
    fn check_relay_loop(&self, envelope: &Envelope) -> Result<(), MeshError> {
        let Some(relay) = &envelope.relay else {
            return Ok(());
        };
        if relay.from == self.self_name {
            return Err(MeshError::RelayLoop);
        }
        if relay.via == self.self_name && envelope.to == self.self_name {
            return Err(MeshError::RelayLoop);
        }
        Ok(())
    }

    fn check_signature(&self, envelope: &Envelope) -> Result<(), MeshError> {
        let sender_requires_signing = self
            .registry
            .is_signing(&envelope.from)
            .unwrap_or(false);

        match &envelope.signature {
            Some(_) => {
                let key_path = self.paths.signing_key(&envelope.from);
                let key = mesh_store::keys::load_signing_key(&key_path)
                    .map_err(|e| MeshError::Store(e.to_string()))?;
                match key {
                    Some(key) if mesh_crypto::verify(&key, envelope) => Ok(()),
                    Some(_) => Err(MeshError::SignatureInvalid),
                    // No key on file to check against: unchecked. Policy
                    // rejects only if this sender is required to sign.
                    None if sender_requires_signing => Err(MeshError::SignatureMissing),
                    None => Ok(()),
                }
            }
            None if sender_requires_signing => Err(MeshError::SignatureMissing),
            None => Ok(()),
        }
    }

    fn check_replay(&self, envelope: &Envelope, now: i64) -> Result<(), MeshError> {
        if envelope.nonce.is_empty() {
            return Ok(());
        }
        if self.nonce_log.has_seen(&envelope.from, &envelope.nonce) {
            return Err(MeshError::ReplayDetected);
        }
        let Some(ts) = mesh_types::from_iso8601_millis(&envelope.timestamp) else {
            return Err(MeshError::InvalidEnvelope("unparseable timestamp".into()));
        };
        let age_secs = (now - ts) / 1000;
        if age_secs > self.replay_window_secs {
            return Err(MeshError::ReplayDetected);
        }
        if age_secs < -CLOCK_SKEW_TOLERANCE_SECS {
            return Err(MeshError::ReplayDetected);
        }
        self.nonce_log
            .record(&envelope.from, &envelope.nonce, now)
            .map_err(|e| MeshError::Store(e.to_string()))?;
        Ok(())
    }
}

/// Maps a validation failure to its audit status string (`rejected_expired`,
/// `rejected_bad_sig`, `rejected_replay`).
pub fn rejection_status(err: &MeshError) -> String {
    match err {
        MeshError::Expired => "rejected_expired".to_string(),
        MeshError::SignatureInvalid | MeshError::SignatureMissing => "rejected_bad_sig".to_string(),
        MeshError::ReplayDetected => "rejected_replay".to_string(),
        other => other.reason_tag(),
    }
}
