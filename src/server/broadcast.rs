//! Broadcast Fan-Out
//!
//! Delivers one serialized line to every active connection except one,
//! usually the client the line is about.
//!
//! A failed delivery is a fault of that recipient only: its writer is gone,
//! or it stopped reading and its queue filled up. The broadcast keeps going
//! to everybody else, and the failed recipients are handed back with the
//! reason so the event loop can drop them.

use crate::connection::{
    ConnectionError, ConnectionHandle, ConnectionKey, ConnectionStats, Registry,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{trace, warn};

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Recipients the payload was queued for
    pub delivered: usize,

    /// Recipients that could not take the payload, and why
    pub failed: Vec<(ConnectionKey, ConnectionError)>,
}

/// Fans lines out to the registry's connections.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    stats: Arc<ConnectionStats>,
}

impl Broadcaster {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        Self { stats }
    }

    /// Sends `payload` verbatim to every active connection except `excluded`.
    ///
    /// Recipients are visited in ascending handle order. `Bytes` clones share
    /// one allocation, so the payload is never copied per recipient.
    pub fn broadcast(
        &self,
        registry: &Registry,
        payload: &Bytes,
        excluded: ConnectionHandle,
    ) -> Delivery {
        let mut delivery = Delivery::default();

        for handle in registry.active_except(excluded) {
            let Some(connection) = registry.get(handle) else {
                continue;
            };

            match connection.send(payload.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!(client = %connection.id(), error = %e, "Delivery failed");
                    delivery.failed.push((connection.key(), e));
                }
            }
        }

        trace!(
            delivered = delivery.delivered,
            failed = delivery.failed.len(),
            bytes = payload.len(),
            "Broadcast"
        );

        self.stats.deliveries_queued(delivery.delivered);

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionLink;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Registry,
        keys: Vec<ConnectionKey>,
        inboxes: Vec<Option<mpsc::Receiver<Bytes>>>,
        broadcaster: Broadcaster,
    }

    fn fixture(clients: usize) -> Fixture {
        fixture_with_queue(clients, 16)
    }

    fn fixture_with_queue(clients: usize, queue_depth: usize) -> Fixture {
        let mut registry = Registry::new();
        let mut keys = Vec::new();
        let mut inboxes = Vec::new();

        for _ in 0..clients {
            let (tx, rx) = mpsc::channel(queue_depth);
            let addr = "127.0.0.1:40000".parse().unwrap();
            keys.push(
                registry
                    .admit(addr, |_| ConnectionLink::detached(tx))
                    .unwrap(),
            );
            inboxes.push(Some(rx));
        }

        Fixture {
            registry,
            keys,
            inboxes,
            broadcaster: Broadcaster::new(Arc::new(ConnectionStats::new())),
        }
    }

    fn drain(inbox: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
        let mut received = Vec::new();
        while let Ok(payload) = inbox.try_recv() {
            received.push(payload);
        }
        received
    }

    fn failed_keys(delivery: &Delivery) -> Vec<ConnectionKey> {
        delivery.failed.iter().map(|(key, _)| *key).collect()
    }

    #[test]
    fn test_reaches_everyone_but_excluded() {
        let mut fx = fixture(4);
        let payload = Bytes::from_static(b"client 1: hello\n");

        let delivery = fx
            .broadcaster
            .broadcast(&fx.registry, &payload, fx.keys[1].handle);

        assert_eq!(delivery.delivered, 3);
        assert!(delivery.failed.is_empty());

        for (i, inbox) in fx.inboxes.iter_mut().enumerate() {
            let received = drain(inbox.as_mut().unwrap());
            if i == 1 {
                assert!(received.is_empty(), "sender got its own line");
            } else {
                assert_eq!(received, vec![payload.clone()]);
            }
        }
    }

    #[test]
    fn test_single_client_gets_nothing() {
        let mut fx = fixture(1);
        let payload = Bytes::from_static(b"server: client 0 just arrived\n");

        let delivery = fx
            .broadcaster
            .broadcast(&fx.registry, &payload, fx.keys[0].handle);

        assert_eq!(delivery.delivered, 0);
        assert!(delivery.failed.is_empty());
        assert!(drain(fx.inboxes[0].as_mut().unwrap()).is_empty());
    }

    #[test]
    fn test_failed_recipient_does_not_stop_fan_out() {
        let mut fx = fixture(4);
        // Client at index 1 lost its writer
        fx.inboxes[1] = None;
        let payload = Bytes::from_static(b"client 0: hi\n");

        let delivery = fx
            .broadcaster
            .broadcast(&fx.registry, &payload, fx.keys[0].handle);

        assert_eq!(delivery.delivered, 2);
        assert_eq!(failed_keys(&delivery), vec![fx.keys[1]]);
        assert!(matches!(delivery.failed[0].1, ConnectionError::WriterClosed));
        assert_eq!(drain(fx.inboxes[2].as_mut().unwrap()), vec![payload.clone()]);
        assert_eq!(drain(fx.inboxes[3].as_mut().unwrap()), vec![payload]);
    }

    #[test]
    fn test_full_queue_fails_only_that_recipient() {
        let mut fx = fixture_with_queue(3, 2);
        let payloads: Vec<Bytes> = (0..3)
            .map(|i| Bytes::from(format!("client 0: line {}\n", i)))
            .collect();

        // Client 2 keeps up; client 1 never reads
        let mut kept_up = Vec::new();
        let mut deliveries = Vec::new();
        for payload in &payloads {
            deliveries.push(
                fx.broadcaster
                    .broadcast(&fx.registry, payload, fx.keys[0].handle),
            );
            kept_up.extend(drain(fx.inboxes[2].as_mut().unwrap()));
        }

        assert_eq!(deliveries[0].delivered, 2);
        assert_eq!(deliveries[1].delivered, 2);
        let last = &deliveries[2];
        assert_eq!(last.delivered, 1);
        assert_eq!(failed_keys(&last), vec![fx.keys[1]]);
        assert!(matches!(
            last.failed[0].1,
            ConnectionError::Backlogged { capacity: 2 }
        ));
        assert_eq!(kept_up, payloads);
        assert_eq!(
            drain(fx.inboxes[1].as_mut().unwrap()),
            payloads[..2].to_vec()
        );
    }

    #[test]
    fn test_order_is_preserved_per_recipient() {
        let mut fx = fixture(2);
        let first = Bytes::from_static(b"client 0: a\n");
        let second = Bytes::from_static(b"client 0: b\n");

        fx.broadcaster
            .broadcast(&fx.registry, &first, fx.keys[0].handle);
        fx.broadcaster
            .broadcast(&fx.registry, &second, fx.keys[0].handle);

        assert_eq!(
            drain(fx.inboxes[1].as_mut().unwrap()),
            vec![first, second]
        );
    }
}
