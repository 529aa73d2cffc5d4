//! Pending-exchange registry: routes acknowledgements back to their waiters.
//!
//! Ack ids come from a monotonically increasing counter and are never
//! reused, so a reply that arrives after its waiter gave up finds no entry
//! and is discarded as stale.

use std::collections::HashMap;

use serde_json::Value;

use crate::codec::AckId;

/// Callback invoked with the reply arguments of an acknowledged send.
pub type ReplyHandler = Box<dyn FnOnce(Vec<Value>) + Send>;

struct Waiter {
    event: String,
    handler: ReplyHandler,
}

/// A waiter removed from the registry, ready to receive its reply.
///
/// Delivery happens after the registry lock has been released.
pub struct Claimed {
    event: String,
    handler: ReplyHandler,
}

impl Claimed {
    /// Event name the waiter was registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Hand the reply to the waiter.
    pub fn deliver(self, args: Vec<Value>) {
        (self.handler)(args);
    }
}

/// Tracks in-flight exchanges by ack id.
pub struct PendingExchanges {
    waiters: HashMap<AckId, Waiter>,
    next_id: u64,
}

impl PendingExchanges {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a reply handler and allocate a fresh ack id for it.
    pub fn register(&mut self, event: &str, handler: ReplyHandler) -> AckId {
        let id = AckId(self.next_id);
        self.next_id += 1;
        let _ = self.waiters.insert(
            id,
            Waiter {
                event: event.to_string(),
                handler,
            },
        );
        id
    }

    /// Remove the waiter for `id`, if it is still pending.
    pub fn claim(&mut self, id: AckId) -> Option<Claimed> {
        self.waiters.remove(&id).map(|w| Claimed {
            event: w.event,
            handler: w.handler,
        })
    }

    /// Drop the waiter for `id` without delivering anything.
    /// Returns `true` if it was still pending.
    pub fn cancel(&mut self, id: AckId) -> bool {
        self.waiters.remove(&id).is_some()
    }

    /// Drop every waiter (their rendezvous observe the closed channel).
    pub fn cancel_all(&mut self) {
        self.waiters.clear();
    }

    /// Whether `id` is still awaiting its reply.
    pub fn contains(&self, id: AckId) -> bool {
        self.waiters.contains_key(&id)
    }

    /// Number of pending exchanges.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether no exchange is pending.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl Default for PendingExchanges {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn oneshot_handler() -> (ReplyHandler, oneshot::Receiver<Vec<Value>>) {
        let (tx, rx) = oneshot::channel();
        let handler: ReplyHandler = Box::new(move |args| {
            let _ = tx.send(args);
        });
        (handler, rx)
    }

    #[test]
    fn new_is_empty() {
        let pending = PendingExchanges::new();
        assert!(pending.is_empty());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut pending = PendingExchanges::new();
        let a = pending.register("get_scores", Box::new(|_| {}));
        let b = pending.register("subscribe", Box::new(|_| {}));
        assert!(b > a);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn ids_not_reused_after_claim() {
        let mut pending = PendingExchanges::new();
        let a = pending.register("get_scores", Box::new(|_| {}));
        let _ = pending.claim(a);
        let b = pending.register("get_scores", Box::new(|_| {}));
        assert_ne!(a, b);
        assert!(pending.claim(a).is_none());
    }

    #[tokio::test]
    async fn claim_delivers_reply() {
        let mut pending = PendingExchanges::new();
        let (handler, rx) = oneshot_handler();
        let id = pending.register("subscribe", handler);

        let claimed = pending.claim(id).unwrap();
        assert_eq!(claimed.event(), "subscribe");
        assert!(pending.is_empty());

        claimed.deliver(vec![json!({"result": "SUCCESS"})]);
        assert_eq!(rx.await.unwrap(), vec![json!({"result": "SUCCESS"})]);
    }

    #[test]
    fn claim_unknown_returns_none() {
        let mut pending = PendingExchanges::new();
        assert!(pending.claim(AckId(99)).is_none());
    }

    #[tokio::test]
    async fn claim_only_once() {
        let mut pending = PendingExchanges::new();
        let (handler, rx) = oneshot_handler();
        let id = pending.register("subscribe", handler);

        pending.claim(id).unwrap().deliver(vec![json!("first")]);
        assert!(pending.claim(id).is_none());

        assert_eq!(rx.await.unwrap(), vec![json!("first")]);
    }

    #[tokio::test]
    async fn cancel_drops_handler() {
        let mut pending = PendingExchanges::new();
        let (handler, rx) = oneshot_handler();
        let id = pending.register("get_scores", handler);

        assert!(pending.cancel(id));
        assert!(!pending.cancel(id));
        assert!(!pending.contains(id));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn cancel_all_drops_handlers() {
        let mut pending = PendingExchanges::new();
        let (h1, rx1) = oneshot_handler();
        let (h2, rx2) = oneshot_handler();
        let _ = pending.register("get_scores", h1);
        let _ = pending.register("subscribe", h2);

        pending.cancel_all();
        assert!(pending.is_empty());

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn multiple_pending_resolve_out_of_order() {
        let mut pending = PendingExchanges::new();
        let (h1, rx1) = oneshot_handler();
        let (h2, rx2) = oneshot_handler();
        let id1 = pending.register("a", h1);
        let id2 = pending.register("b", h2);

        pending.claim(id2).unwrap().deliver(vec![json!(2)]);
        assert!(pending.contains(id1));
        pending.claim(id1).unwrap().deliver(vec![json!(1)]);

        assert_eq!(rx1.await.unwrap(), vec![json!(1)]);
        assert_eq!(rx2.await.unwrap(), vec![json!(2)]);
    }
}
