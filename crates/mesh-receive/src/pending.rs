//! Correlates inbound `type=response` envelopes to the caller still
//! waiting on them.

use dashmap::DashMap;
use mesh_types::Envelope;
use tokio::sync::oneshot;

/// Concurrent correlation-id → waiter table. One entry per in-flight
/// synchronous `send`-and-wait call; `router.rs` removes and fires the
/// waiter the moment a matching response arrives.
#[derive(Default)]
pub struct PendingTable {
    waiters: DashMap<String, oneshot::Sender<Envelope>>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable::default()
    }

    /// Register interest in a correlation id, returning the receiving half
    /// the caller should await.
    pub fn register(&self, correlation_id: impl Into<String>) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(correlation_id.into(), tx);
        rx
    }

    /// Deliver a response envelope to its waiter, if one is still
    /// registered. Returns `false` if nobody was waiting (e.g. the caller
    /// already timed out) — the response is simply dropped in that case.
    pub fn fire(&self, correlation_id: &str, envelope: Envelope) -> bool {
        match self.waiters.remove(correlation_id) {
            Some((_, tx)) => tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Drop a waiter without firing it, e.g. after the caller's own timeout.
    pub fn cancel(&self, correlation_id: &str) {
        self.waiters.remove(correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::EnvelopeType;

    #[tokio::test]
    async fn registered_waiter_receives_fired_response() {
        let table = PendingTable::new();
        let rx = table.register("msg_1");
        let mut response = Envelope::builder("agent-b", "agent-a", EnvelopeType::Response);
        response.correlation_id = Some("msg_1".into());
        assert!(table.fire("msg_1", response.clone()));
        let got = rx.await.unwrap();
        assert_eq!(got.correlation_id, response.correlation_id);
    }

    #[test]
    fn firing_an_unregistered_id_is_a_no_op() {
        let table = PendingTable::new();
        let response = Envelope::builder("agent-b", "agent-a", EnvelopeType::Response);
        assert!(!table.fire("msg_ghost", response));
    }

    #[test]
    fn cancel_removes_the_waiter() {
        let table = PendingTable::new();
        let _rx = table.register("msg_1");
        table.cancel("msg_1");
        let response = Envelope::builder("agent-b", "agent-a", EnvelopeType::Response);
        assert!(!table.fire("msg_1", response));
    }
}
