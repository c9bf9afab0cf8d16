//! Schema-gated event bus for cross-store communication.
//!
//! This module provides the [`EventBus`]: a synchronous publish/subscribe
//! registry where the set of legal events must be declared up front. Stores
//! (and any other in-process code) subscribe to declared events; emitters
//! publish payloads that are validated against the declared shape before any
//! listener runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ define_events│◄─── wholesale schema declaration
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐     undeclared event ──► EventBusError::UndeclaredEvent
//! │  on / emit   │
//! └──────┬───────┘     bad payload ──► EventBusError::Schema (no listener runs)
//!        │
//!   ┌────┴─────┐
//!   ▼          ▼
//! listener  listener      synchronous, registration order
//! ```
//!
//! # Key Principles
//!
//! - **Declare first**: subscription and emission on an undeclared event are
//!   rejected, never silently dropped
//! - **Validate at the emit boundary**: one check per emit, regardless of
//!   listener count; no listener observes a non-conforming payload
//! - **Synchronous fan-out**: listeners run inline, in registration order,
//!   before `emit` returns; there is no queueing or async dispatch
//! - **Listener panics are not caught**: they propagate to the emitter
//!
//! # Example
//!
//! ```
//! use statebus_runtime::bus::EventBus;
//! use statebus_core::schema::EventSchema;
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let mut bus = EventBus::new();
//! bus.define_events(EventSchema::new().declare("greeting", shape! { "msg": String }));
//!
//! bus.on("greeting", |payload| println!("{payload}"))?;
//! let delivered = bus.emit("greeting", &json!({ "msg": "hello" }))?;
//! assert_eq!(delivered, 1);
//! # Ok::<(), statebus_runtime::bus::EventBusError>(())
//! ```

use serde_json::Value;
use smallvec::SmallVec;
use statebus_core::schema::{EventSchema, SchemaError};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// The event name was never declared via
    /// [`define_events`](EventBus::define_events).
    #[error("undeclared event '{event}'")]
    UndeclaredEvent {
        /// The offending event name.
        event: String,
    },

    /// The emitted payload did not conform to the declared shape.
    #[error("invalid payload: {0}")]
    Schema(#[from] SchemaError),
}

/// Stable identifier for one bus subscription.
///
/// Returned by [`EventBus::on`] and consumed by
/// [`EventBus::remove_listener`], enabling single-listener removal without
/// disturbing other subscribers of the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Boxed listener callback invoked with the emitted payload.
pub type ListenerFn = Box<dyn FnMut(&Value)>;

struct Listener {
    id: ListenerId,
    callback: ListenerFn,
}

/// A synchronous, schema-gated publish/subscribe registry.
///
/// The bus owns the declared [`EventSchema`] and an ordered listener list per
/// event. It is deliberately single-threaded (`&mut self` mutation, no
/// interior locking): the whole architecture is a cooperative, synchronous
/// layer with no suspension points.
///
/// Constructed by the application's composition root and passed by reference
/// wherever bus access is needed; there is no ambient global instance.
#[derive(Default)]
pub struct EventBus {
    schema: EventSchema,
    listeners: HashMap<String, SmallVec<[Listener; 2]>>,
    next_listener: u64,
}

impl EventBus {
    /// Create a bus with no declared events and no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire declared-event set.
    ///
    /// Wholesale semantics: a second call discards all prior declarations,
    /// there is no incremental merge. Existing listeners are left in place,
    /// but any whose event is no longer declared can never fire again (both
    /// `on` and `emit` reject the name).
    pub fn define_events(&mut self, schema: EventSchema) {
        tracing::debug!(events = schema.len(), "declaring event schema");
        self.schema = schema;
    }

    /// Clear all subscriptions and all declared schemas.
    ///
    /// Returns the bus to a pristine state; any previously declared event is
    /// undeclared again afterwards.
    pub fn reset_events(&mut self) {
        tracing::debug!("resetting event bus");
        self.schema = EventSchema::new();
        self.listeners.clear();
        self.next_listener = 0;
    }

    /// Register a listener for a declared event.
    ///
    /// Listeners fire in registration order on every subsequent emit of
    /// `event`. Multiple listeners per event are permitted.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::UndeclaredEvent`] if `event` is not present
    /// in the declared schema.
    pub fn on(
        &mut self,
        event: &str,
        callback: impl FnMut(&Value) + 'static,
    ) -> Result<ListenerId, EventBusError> {
        if !self.schema.contains(event) {
            return Err(EventBusError::UndeclaredEvent {
                event: event.to_string(),
            });
        }
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(Listener {
                id,
                callback: Box::new(callback),
            });
        tracing::trace!(event, %id, "registered listener");
        Ok(id)
    }

    /// Emit a declared event, validating the payload first.
    ///
    /// On success every registered listener for `event` is invoked
    /// synchronously, in registration order, with `payload` unchanged.
    /// Returns the number of listeners invoked (zero is not an error:
    /// a declared event may simply have no subscribers yet).
    ///
    /// # Errors
    ///
    /// - [`EventBusError::UndeclaredEvent`] if `event` was never declared
    /// - [`EventBusError::Schema`] if `payload` does not conform to the
    ///   declared shape; no listener is invoked in that case
    pub fn emit(&mut self, event: &str, payload: &Value) -> Result<usize, EventBusError> {
        let shape = self
            .schema
            .shape(event)
            .ok_or_else(|| EventBusError::UndeclaredEvent {
                event: event.to_string(),
            })?;
        shape.check(payload)?;

        let Some(listeners) = self.listeners.get_mut(event) else {
            tracing::trace!(event, "emitted event with no listeners");
            return Ok(0);
        };
        tracing::debug!(event, listeners = listeners.len(), "emitting event");
        for listener in listeners.iter_mut() {
            (listener.callback)(payload);
        }
        Ok(listeners.len())
    }

    /// Detach a single listener, leaving the schema and all other listeners
    /// of the same event untouched.
    ///
    /// Returns `true` if the listener was present. Removal works even for
    /// events that are no longer declared, so teardown never gets stuck
    /// behind a schema replacement.
    pub fn remove_listener(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        let removed = listeners.len() < before;
        if removed {
            tracing::trace!(event, %id, "removed listener");
        }
        removed
    }

    /// Detach every listener for `event` without touching schema
    /// declarations.
    pub fn remove_all_listeners(&mut self, event: &str) {
        if self.listeners.remove(event).is_some() {
            tracing::trace!(event, "removed all listeners");
        }
    }

    /// The currently declared schema.
    #[must_use]
    pub const fn schema(&self) -> &EventSchema {
        &self.schema
    }

    /// Number of listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, SmallVec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("schema", &self.schema)
            .field(
                "listeners",
                &self
                    .listeners
                    .iter()
                    .map(|(event, list)| (event.as_str(), list.len()))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use serde_json::json;
    use statebus_core::shape;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn declared_bus() -> EventBus {
        let mut bus = EventBus::new();
        bus.define_events(EventSchema::new().declare("event1", shape! { "msg": String }));
        bus
    }

    #[test]
    fn on_rejects_undeclared_events() {
        let mut bus = EventBus::new();
        let err = bus.on("unknown event", |_| {}).unwrap_err();
        assert_eq!(
            err,
            EventBusError::UndeclaredEvent {
                event: "unknown event".to_string()
            }
        );
    }

    #[test]
    fn emit_rejects_undeclared_events() {
        let mut bus = EventBus::new();
        let err = bus.emit("event1", &json!({ "msg": "hi" })).unwrap_err();
        assert!(matches!(err, EventBusError::UndeclaredEvent { .. }));
    }

    #[test]
    fn emit_rejects_non_conforming_payloads_before_any_listener_runs() {
        let mut bus = declared_bus();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        bus.on("event1", move |_| *counter.borrow_mut() += 1).unwrap();

        let err = bus.emit("event1", &json!({ "msg": 1 })).unwrap_err();
        assert!(matches!(err, EventBusError::Schema(_)));
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn emit_fans_out_in_registration_order_with_exact_payload() {
        let mut bus = declared_bus();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            bus.on("event1", move |payload| {
                order.borrow_mut().push((tag, payload.clone()));
            })
            .unwrap();
        }

        let payload = json!({ "msg": "hello" });
        let delivered = bus.emit("event1", &payload).unwrap();

        assert_eq!(delivered, 3);
        let seen = order.borrow();
        assert_eq!(
            seen.iter().map(|(tag, _)| *tag).collect::<Vec<_>>(),
            ["first", "second", "third"]
        );
        assert!(seen.iter().all(|(_, p)| *p == payload));
    }

    #[test]
    fn emit_with_no_listeners_delivers_zero() {
        let mut bus = declared_bus();
        assert_eq!(bus.emit("event1", &json!({ "msg": "hi" })).unwrap(), 0);
    }

    #[test]
    fn reset_events_clears_schemas_and_listeners() {
        let mut bus = declared_bus();
        bus.on("event1", |_| {}).unwrap();
        bus.reset_events();

        assert!(matches!(
            bus.on("event1", |_| {}).unwrap_err(),
            EventBusError::UndeclaredEvent { .. }
        ));
        assert!(matches!(
            bus.emit("event1", &json!({ "msg": "hi" })).unwrap_err(),
            EventBusError::UndeclaredEvent { .. }
        ));
    }

    #[test]
    fn define_events_is_wholesale_replacement() {
        let mut bus = declared_bus();
        bus.define_events(EventSchema::new().declare("event2", shape! { "n": Integer }));

        assert!(matches!(
            bus.emit("event1", &json!({ "msg": "hi" })).unwrap_err(),
            EventBusError::UndeclaredEvent { .. }
        ));
        assert_eq!(bus.emit("event2", &json!({ "n": 1 })).unwrap(), 0);
    }

    #[test]
    fn remove_listener_detaches_only_the_identified_listener() {
        let mut bus = declared_bus();
        let hits = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let hits = Rc::clone(&hits);
            bus.on("event1", move |_| hits.borrow_mut().push("first")).unwrap()
        };
        {
            let hits = Rc::clone(&hits);
            bus.on("event1", move |_| hits.borrow_mut().push("second")).unwrap();
        }

        assert!(bus.remove_listener("event1", first));
        assert!(!bus.remove_listener("event1", first));

        bus.emit("event1", &json!({ "msg": "x" })).unwrap();
        assert_eq!(*hits.borrow(), vec!["second"]);
    }

    #[test]
    fn remove_all_listeners_keeps_schema_declarations() {
        let mut bus = declared_bus();
        bus.on("event1", |_| {}).unwrap();
        bus.remove_all_listeners("event1");

        assert_eq!(bus.listener_count("event1"), 0);
        // Still declared: emit succeeds with zero deliveries.
        assert_eq!(bus.emit("event1", &json!({ "msg": "x" })).unwrap(), 0);
    }
}
