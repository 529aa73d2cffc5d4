//! Handlers for unsolicited server-pushed events.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Handler for one pushed event name.
///
/// Runs on the channel's delivery task and must not block.
pub trait PushHandler: Send + Sync {
    /// Handle the event arguments.
    fn handle(&self, args: &[Value]);
}

impl<F> PushHandler for F
where
    F: Fn(&[Value]) + Send + Sync,
{
    fn handle(&self, args: &[Value]) {
        self(args);
    }
}

/// Push handlers keyed by event name.
///
/// Cloning shares the same table, so handlers registered after connecting
/// are seen by the delivery task.
#[derive(Clone, Default)]
pub struct PushHandlers {
    inner: Arc<RwLock<HashMap<String, Arc<dyn PushHandler>>>>,
}

impl PushHandlers {
    /// Create an empty handler table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `event`.
    pub fn register(&self, event: &str, handler: impl PushHandler + 'static) {
        let _ = self
            .inner
            .write()
            .insert(event.to_string(), Arc::new(handler));
    }

    /// Invoke the handler for `event`. Returns `false` if none is registered.
    pub fn dispatch(&self, event: &str, args: &[Value]) -> bool {
        let handler = self.inner.read().get(event).cloned();
        match handler {
            Some(handler) => {
                handler.handle(args);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn dispatch_invokes_handler() {
        let handlers = PushHandlers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handlers.register("ping", move |args: &[Value]| {
            sink.lock().extend_from_slice(args);
        });

        assert!(handlers.dispatch("ping", &[json!({"message": "hi"})]));
        assert_eq!(*seen.lock(), vec![json!({"message": "hi"})]);
    }

    #[test]
    fn dispatch_unknown_returns_false() {
        let handlers = PushHandlers::new();
        assert!(!handlers.dispatch("nope", &[]));
    }

    #[test]
    fn register_replaces_previous() {
        let handlers = PushHandlers::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let first = hits.clone();
        handlers.register("ping", move |_: &[Value]| first.lock().push("first"));
        let second = hits.clone();
        handlers.register("ping", move |_: &[Value]| second.lock().push("second"));

        assert!(handlers.dispatch("ping", &[]));
        assert_eq!(*hits.lock(), vec!["second"]);
    }

    #[test]
    fn clones_share_table() {
        let handlers = PushHandlers::new();
        let copy = handlers.clone();
        handlers.register("ping", |_: &[Value]| {});
        assert!(copy.dispatch("ping", &[]));
    }

    #[test]
    fn handler_may_register_while_dispatching() {
        let handlers = PushHandlers::new();
        let inner = handlers.clone();
        handlers.register("first", move |_: &[Value]| {
            inner.register("second", |_: &[Value]| {});
        });

        assert!(handlers.dispatch("first", &[]));
        assert!(handlers.dispatch("second", &[]));
    }
}
