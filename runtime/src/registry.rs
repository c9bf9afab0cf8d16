//! The store registry: named stores, lazy initialization, bus wiring.
//!
//! A [`StoreRegistry`] owns the [`EventBus`] and the mapping from store name
//! to [`Store`]. It is constructed once by the application's composition
//! root and passed by reference to any code needing store or bus access —
//! there is no ambient global registry.
//!
//! # Lifecycle
//!
//! ```text
//! define(name, config)          capture definition, validate structure
//!         │
//!         ▼
//! fetch(name, config)  ──first── apply computed defaults and initializers,
//!         │                      validate fetch-time states/deps,
//!         │                      bind handlers to the bus, mark initialized
//!         │
//!         └──────later── merge supplied config, return the same instance
//!
//! reset()                       detach every store-installed listener
//!                               (one by one), clear the registry
//! ```
//!
//! Handler binding time is a policy decision, not an accident: the default
//! [`BindingPolicy::OnFirstFetch`] defers bus wiring until a store is first
//! fetched, while [`BindingPolicy::OnDefine`] wires handlers as soon as the
//! store is defined (which requires the events to be declared by then).
//!
//! # Example
//!
//! ```
//! use statebus_runtime::registry::StoreRegistry;
//! use statebus_runtime::store::StoreConfig;
//! use statebus_core::schema::EventSchema;
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let mut registry = StoreRegistry::new();
//! registry
//!     .bus_mut()
//!     .define_events(EventSchema::new().declare("counter/incremented", shape! {}));
//!
//! registry.define(
//!     "counter",
//!     StoreConfig::new()
//!         .init_state("count", |_| json!(0))
//!         .export("count", |store| store.state("count").unwrap_or(json!(null)))
//!         .register("counter/incremented", |store, _| {
//!             let n = store.state("count").and_then(|v| v.as_i64()).unwrap_or(0);
//!             store.set("count", json!(n + 1));
//!         }),
//! )?;
//!
//! let counter = registry.fetch("counter")?;
//! registry.emit("counter/incremented", &json!({}))?;
//! assert_eq!(counter.get("count")?, json!(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde_json::Value;
use std::collections::HashMap;

use crate::bus::{EventBus, EventBusError, ListenerId};
use crate::store::{FetchConfig, Store, StoreConfig, StoreError};

/// When a store's registered handlers are bound to the event bus.
///
/// The architecture evolved from define-time binding to fetch-time binding;
/// both remain valid wirings, so the choice is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    /// Bind handlers during the store's first fetch (the default).
    #[default]
    OnFirstFetch,
    /// Bind handlers immediately at `define` time. The registered events
    /// must already be declared on the bus when `define` runs.
    OnDefine,
}

struct StoreEntry {
    store: Store,
    /// Bus subscriptions this store installed, for single-listener teardown.
    subscriptions: Vec<(String, ListenerId)>,
}

/// Mapping from store name to store, plus the event bus they share.
///
/// All mutation is `&mut self`: the registry is a single-threaded,
/// synchronous facility with no interior locking.
#[derive(Default)]
pub struct StoreRegistry {
    bus: EventBus,
    stores: HashMap<String, StoreEntry>,
    binding: BindingPolicy,
}

impl StoreRegistry {
    /// A registry with a fresh, empty bus and default binding policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry wrapping an externally constructed bus.
    #[must_use]
    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            bus,
            stores: HashMap::new(),
            binding: BindingPolicy::default(),
        }
    }

    /// Select when registered handlers are bound to the bus.
    #[must_use]
    pub const fn with_binding_policy(mut self, binding: BindingPolicy) -> Self {
        self.binding = binding;
        self
    }

    /// Shared access to the owned event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Mutable access to the owned event bus (declaring events, direct
    /// subscription, emission).
    pub const fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Emit an event on the owned bus.
    ///
    /// Convenience passthrough to [`EventBus::emit`]; returns the number of
    /// listeners invoked.
    ///
    /// # Errors
    ///
    /// Propagates [`EventBusError`] for undeclared events and payload shape
    /// violations.
    pub fn emit(&mut self, event: &str, payload: &Value) -> Result<usize, EventBusError> {
        self.bus.emit(event, payload)
    }

    /// Register a store definition under `name`.
    ///
    /// The definition is validated structurally before being accepted.
    /// Re-defining an existing name overwrites it, last write wins; any
    /// handlers the previous store had already bound stay on the bus until
    /// [`reset`](Self::reset), matching the global-teardown-only contract.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfiguration`] for structural mistakes (empty
    ///   names, an event registered twice in one definition)
    /// - [`StoreError::Bus`] under [`BindingPolicy::OnDefine`] if a
    ///   registered event is not declared on the bus
    pub fn define(&mut self, name: impl Into<String>, config: StoreConfig) -> Result<(), StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::InvalidConfiguration {
                reason: "store name must not be empty".to_string(),
            });
        }
        config.validate()?;

        tracing::debug!(store = %name, "defining store");
        let mut entry = StoreEntry {
            store: Store::new(name.clone(), config),
            subscriptions: Vec::new(),
        };
        if self.binding == BindingPolicy::OnDefine {
            Self::bind_registers(&mut self.bus, &mut entry)?;
        }
        if self.stores.insert(name.clone(), entry).is_some() {
            tracing::warn!(store = %name, "redefined existing store; previous definition dropped");
        }
        Ok(())
    }

    /// Fetch a store with no fetch-time configuration.
    ///
    /// # Errors
    ///
    /// See [`fetch_with`](Self::fetch_with).
    pub fn fetch(&mut self, name: &str) -> Result<Store, StoreError> {
        self.fetch_with(name, FetchConfig::new())
    }

    /// Fetch a store, triggering one-time lazy initialization.
    ///
    /// On the first fetch of a store the registry applies computed defaults
    /// and initializers, validates and applies the supplied configuration,
    /// binds registered handlers to the bus (under the default policy), and
    /// marks the store initialized. Later fetches skip all of that and just
    /// merge any newly supplied config before returning the same instance.
    ///
    /// A failed first fetch leaves whatever partial state existed before the
    /// failure; there is no rollback. Callers must treat it as a
    /// configuration error, not a runtime condition to recover from.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownStore`] if `name` was never defined
    /// - [`StoreError::Schema`] if supplied states or deps do not conform to
    ///   the declared shapes
    /// - [`StoreError::Bus`] if a registered event is not declared on the bus
    /// - [`StoreError::InvalidConfiguration`] if a supplied section is
    ///   malformed or names an undeclared dep
    pub fn fetch_with(&mut self, name: &str, config: FetchConfig) -> Result<Store, StoreError> {
        let entry = self
            .stores
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownStore {
                store: name.to_string(),
            })?;
        let store = entry.store.clone();

        if store.is_initialized() {
            if !config.is_empty() {
                store.config(config)?;
            }
            return Ok(store);
        }

        tracing::debug!(store = name, "initializing store on first fetch");
        store.initialize(&config)?;
        if self.binding == BindingPolicy::OnFirstFetch {
            Self::bind_registers(&mut self.bus, entry)?;
        }
        store.mark_initialized();
        Ok(store)
    }

    /// Tear down every store and its bus subscriptions.
    ///
    /// Each subscription is detached individually via
    /// [`EventBus::remove_listener`], so listeners installed outside the
    /// registry (or by other stores on the same event) are never touched.
    /// Idempotent; safe with zero stores defined. Declared event schemas are
    /// left in place — use [`EventBus::reset_events`] for those.
    pub fn reset(&mut self) {
        let stores = self.stores.len();
        for entry in self.stores.values_mut() {
            for (event, id) in entry.subscriptions.drain(..) {
                self.bus.remove_listener(&event, id);
            }
        }
        self.stores.clear();
        tracing::debug!(stores, "reset store registry");
    }

    /// Whether a store is defined under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Number of defined stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no stores are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Bind every registered handler of `entry` to the bus, in declaration
    /// order, recording the listener ids for later teardown.
    ///
    /// An undeclared event aborts binding mid-way; already-installed
    /// listeners stay recorded so `reset` can still detach them.
    fn bind_registers(bus: &mut EventBus, entry: &mut StoreEntry) -> Result<(), StoreError> {
        for (event, handler) in entry.store.registers() {
            let store = entry.store.clone();
            let id = bus.on(&event, move |payload| {
                (handler.borrow_mut())(&store, payload);
            })?;
            entry.subscriptions.push((event, id));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("bus", &self.bus)
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("binding", &self.binding)
            .finish()
    }
}
