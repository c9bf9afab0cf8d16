//! # Statebus Testing
//!
//! Testing utilities and helpers for the statebus architecture.
//!
//! This crate provides:
//! - [`probes::EventProbe`]: a recording listener for asserting on delivery,
//!   ordering, and payload fidelity
//! - [`helpers`]: tracing initialization and schema shorthands for tests
//!
//! ## Example
//!
//! ```
//! use statebus_testing::probes::EventProbe;
//! use statebus_runtime::EventBus;
//! use statebus_core::schema::EventSchema;
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let mut bus = EventBus::new();
//! bus.define_events(EventSchema::new().declare("ping", shape! { "n": Integer }));
//!
//! let probe = EventProbe::new();
//! bus.on("ping", probe.listener())?;
//! bus.emit("ping", &json!({ "n": 1 }))?;
//!
//! assert_eq!(probe.payloads(), vec![json!({ "n": 1 })]);
//! # Ok::<(), statebus_runtime::EventBusError>(())
//! ```

/// Recording listeners for delivery assertions.
pub mod probes {
    use serde_json::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// One delivery observed by an [`EventProbe`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedEvent {
        /// The label of the listener that observed the delivery, if any.
        pub label: Option<String>,
        /// The payload exactly as delivered.
        pub payload: Value,
    }

    /// A probe that records every payload its listeners receive, in
    /// delivery order.
    ///
    /// Clones share the same recording, so a single probe can back several
    /// labeled listeners and the interleaving of all of them can be
    /// asserted afterwards.
    #[derive(Debug, Clone, Default)]
    pub struct EventProbe {
        events: Rc<RefCell<Vec<RecordedEvent>>>,
    }

    impl EventProbe {
        /// A probe with an empty recording.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// An unlabeled recording listener.
        #[must_use]
        pub fn listener(&self) -> impl FnMut(&Value) + use<> {
            let events = Rc::clone(&self.events);
            move |payload: &Value| {
                events.borrow_mut().push(RecordedEvent {
                    label: None,
                    payload: payload.clone(),
                });
            }
        }

        /// A labeled recording listener, for ordering assertions across
        /// several subscribers.
        #[must_use]
        pub fn labeled_listener<S: Into<String>>(&self, label: S) -> impl FnMut(&Value) + use<S> {
            let events = Rc::clone(&self.events);
            let label = label.into();
            move |payload: &Value| {
                events.borrow_mut().push(RecordedEvent {
                    label: Some(label.clone()),
                    payload: payload.clone(),
                });
            }
        }

        /// Every recorded delivery, in order.
        #[must_use]
        pub fn recorded(&self) -> Vec<RecordedEvent> {
            self.events.borrow().clone()
        }

        /// The recorded payloads, in delivery order.
        #[must_use]
        pub fn payloads(&self) -> Vec<Value> {
            self.events
                .borrow()
                .iter()
                .map(|event| event.payload.clone())
                .collect()
        }

        /// The labels of labeled deliveries, in delivery order.
        #[must_use]
        pub fn labels(&self) -> Vec<String> {
            self.events
                .borrow()
                .iter()
                .filter_map(|event| event.label.clone())
                .collect()
        }

        /// Number of recorded deliveries.
        #[must_use]
        pub fn len(&self) -> usize {
            self.events.borrow().len()
        }

        /// Whether nothing was delivered yet.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.events.borrow().is_empty()
        }

        /// Forget everything recorded so far.
        pub fn clear(&self) {
            self.events.borrow_mut().clear();
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use statebus_core::schema::{EventSchema, Shape};

    /// Initialize tracing for a test binary, honoring `RUST_LOG`.
    ///
    /// Safe to call from every test; only the first call installs the
    /// subscriber.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }

    /// An [`EventSchema`] declaring each named event with an
    /// accept-anything payload shape, for tests that do not care about
    /// payload structure.
    #[must_use]
    pub fn loose_schema<'a>(events: impl IntoIterator<Item = &'a str>) -> EventSchema {
        events
            .into_iter()
            .map(|event| (event, Shape::Any))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::helpers::loose_schema;
    use super::probes::EventProbe;
    use serde_json::json;
    use statebus_runtime::EventBus;

    #[test]
    fn probe_records_deliveries_in_order_with_labels() {
        let mut bus = EventBus::new();
        bus.define_events(loose_schema(["e"]));

        let probe = EventProbe::new();
        bus.on("e", probe.labeled_listener("first")).unwrap();
        bus.on("e", probe.labeled_listener("second")).unwrap();

        bus.emit("e", &json!(1)).unwrap();
        bus.emit("e", &json!(2)).unwrap();

        assert_eq!(probe.len(), 4);
        assert_eq!(probe.labels(), vec!["first", "second", "first", "second"]);
        assert_eq!(probe.payloads(), vec![json!(1), json!(1), json!(2), json!(2)]);

        probe.clear();
        assert!(probe.is_empty());
    }
}
