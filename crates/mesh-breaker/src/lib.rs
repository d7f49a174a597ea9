//! Per-peer circuit breaker.
//!
//! Closed/Open/HalfOpen per peer with cooldown. Pure state-machine
//! functions operate on [`mesh_store::CircuitStore`]'s record; there is no
//! I/O of the breaker's own.

use mesh_store::CircuitStore;
use mesh_types::{CircuitRecord, CircuitState, MeshError};

pub const TRIP_THRESHOLD: u32 = 3;
pub const OPEN_COOLDOWN_SECS: i64 = 60;

/// What the send pipeline should do before attempting a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed with a normal send.
    Allow,
    /// Proceed, but this is the single half-open probe — a failure here
    /// re-opens the circuit immediately.
    Probe,
    /// Short-circuit: dead-letter with reason `circuit_open`.
    Deny,
}

pub struct Breaker<'a> {
    store: &'a CircuitStore,
}

impl<'a> Breaker<'a> {
    pub fn new(store: &'a CircuitStore) -> Self {
        Breaker { store }
    }

    /// Consult the breaker before a send attempt, transitioning
    /// `open` → `half-open` in place if the cooldown has elapsed.
    pub fn admit(&self, peer: &str, now_ms: i64) -> Result<Admission, MeshError> {
        self.store.mutate_peer(peer, |record| admit_record(record, now_ms))
    }

    pub fn record_success(&self, peer: &str) -> Result<(), MeshError> {
        self.store.mutate_peer(peer, |record| {
            record.state = CircuitState::Closed;
            record.failures = 0;
            record.open_until = None;
        })
    }

    pub fn record_failure(&self, peer: &str, now_ms: i64) -> Result<CircuitState, MeshError> {
        self.store.mutate_peer(peer, |record| {
            record_failure_on(record, now_ms);
            record.state
        })
    }

    pub fn get(&self, peer: &str) -> Result<CircuitRecord, MeshError> {
        self.store.get(peer)
    }
}

fn admit_record(record: &mut CircuitRecord, now_ms: i64) -> Admission {
    match record.state {
        CircuitState::Closed => Admission::Allow,
        CircuitState::HalfOpen => Admission::Probe,
        CircuitState::Open => {
            if record.open_until.map(|t| now_ms >= t).unwrap_or(true) {
                record.state = CircuitState::HalfOpen;
                Admission::Probe
            } else {
                Admission::Deny
            }
        }
    }
}

fn record_failure_on(record: &mut CircuitRecord, now_ms: i64) {
    record.failures += 1;
    record.last_failure = Some(now_ms);
    let should_trip = match record.state {
        CircuitState::HalfOpen => true,
        CircuitState::Closed => record.failures >= TRIP_THRESHOLD,
        CircuitState::Open => true,
    };
    if should_trip {
        record.state = CircuitState::Open;
        record.open_until = Some(now_ms + OPEN_COOLDOWN_SECS * 1000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_store::CircuitStore;

    fn store() -> (tempfile::TempDir, CircuitStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CircuitStore::open(dir.path().join("circuits.json"));
        (dir, store)
    }

    #[test]
    fn three_failures_trip_the_breaker() {
        let (_dir, store) = store();
        let breaker = Breaker::new(&store);
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        let state = breaker.record_failure("b", 0).unwrap();
        assert_eq!(state, CircuitState::Open);
        let record = breaker.get("b").unwrap();
        assert_eq!(record.open_until, Some(60_000));
    }

    #[test]
    fn open_denies_until_cooldown_elapses() {
        let (_dir, store) = store();
        let breaker = Breaker::new(&store);
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();

        assert_eq!(breaker.admit("b", 1_000).unwrap(), Admission::Deny);
        assert_eq!(breaker.admit("b", 60_000).unwrap(), Admission::Probe);
    }

    #[test]
    fn success_after_probe_closes_circuit() {
        let (_dir, store) = store();
        let breaker = Breaker::new(&store);
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        breaker.admit("b", 60_000).unwrap();
        breaker.record_success("b").unwrap();

        let record = breaker.get("b").unwrap();
        assert_eq!(record.state, CircuitState::Closed);
        assert_eq!(record.failures, 0);
        assert_eq!(breaker.admit("b", 61_000).unwrap(), Admission::Allow);
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let (_dir, store) = store();
        let breaker = Breaker::new(&store);
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        breaker.record_failure("b", 0).unwrap();
        breaker.admit("b", 60_000).unwrap();
        let state = breaker.record_failure("b", 60_100).unwrap();
        assert_eq!(state, CircuitState::Open);
    }

    #[test]
    fn closed_circuit_allows_sends() {
        let (_dir, store) = store();
        let breaker = Breaker::new(&store);
        assert_eq!(breaker.admit("b", 0).unwrap(), Admission::Allow);
    }
}
