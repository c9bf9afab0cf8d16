//! Named stores: mutable key/value state, computed exports, event handlers.
//!
//! A [`Store`] is a named singleton created by
//! [`StoreRegistry::define`](crate::registry::StoreRegistry::define) and
//! handed out by [`fetch`](crate::registry::StoreRegistry::fetch). Its
//! definition is an explicit [`StoreConfig`] record enumerating the
//! recognized pieces:
//!
//! - **exports** — named zero-argument compute functions, invoked fresh on
//!   every [`get`](Store::get) (not memoized), so they reflect current state
//! - **registers** — event name → handler, bound to the event bus at
//!   store-initialization time
//! - **`init_states` shape** — what fetch-time initial-state configuration
//!   must look like
//! - **dep shapes** — what fetch-time collaborator values must look like
//! - **state initializers** — computed defaults applied once at first fetch
//!
//! Handles are cheap `Rc` clones sharing one interior-mutable body; the whole
//! architecture is single-threaded and synchronous, so no locking is
//! involved.

use serde_json::Value;
use statebus_core::schema::{SchemaError, Shape};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

use crate::bus::EventBusError;

/// Errors that can occur during store definition, fetch, and access.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A fetch named a store that was never defined.
    #[error("unknown store '{store}'")]
    UnknownStore {
        /// The requested store name.
        store: String,
    },

    /// A `get` named an export the store does not declare.
    #[error("store '{store}' declares no export '{export}'")]
    UndeclaredExport {
        /// The store being read.
        store: String,
        /// The undeclared export name.
        export: String,
    },

    /// A structurally malformed definition or configuration, caught at
    /// `define`/`config` time.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Fetch-time configuration (initial states or deps) did not conform to
    /// the declared shape.
    #[error("configuration rejected: {0}")]
    Schema(#[from] SchemaError),

    /// Binding a registered handler to the event bus failed.
    #[error(transparent)]
    Bus(#[from] EventBusError),
}

/// A zero-argument export compute function, evaluated against the store on
/// every `get`.
pub type ExportFn = Rc<dyn Fn(&Store) -> Value>;

/// An event handler owned by a store, invoked with the store and the
/// validated payload.
pub type HandlerFn = Rc<RefCell<dyn FnMut(&Store, &Value)>>;

/// A state initializer, invoked with the store at first fetch.
pub type StateInitFn = Rc<dyn Fn(&Store) -> Value>;

/// Explicit definition record for a store.
///
/// Built with chained calls and handed to
/// [`StoreRegistry::define`](crate::registry::StoreRegistry::define), which
/// validates it structurally before accepting it.
///
/// # Example
///
/// ```
/// use statebus_runtime::store::StoreConfig;
/// use statebus_core::shape;
/// use serde_json::json;
///
/// let config = StoreConfig::new()
///     .init_state("count", |_| json!(0))
///     .export("count", |store| store.state("count").unwrap_or(json!(null)))
///     .register("counter/incremented", |store, _payload| {
///         let next = store.state("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
///         store.set("count", json!(next));
///     })
///     .dep("Session", shape! { "user": String });
/// ```
#[derive(Clone, Default)]
pub struct StoreConfig {
    pub(crate) exports: BTreeMap<String, ExportFn>,
    pub(crate) registers: Vec<(String, HandlerFn)>,
    pub(crate) init_states: Option<Shape>,
    pub(crate) deps: BTreeMap<String, Shape>,
    pub(crate) init_state_fns: Vec<(String, StateInitFn)>,
    pub(crate) default_state_fns: Vec<(String, StateInitFn)>,
}

impl StoreConfig {
    /// An empty definition: no exports, no handlers, no declared shapes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named export. A later declaration under the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn export(mut self, name: impl Into<String>, f: impl Fn(&Store) -> Value + 'static) -> Self {
        self.exports.insert(name.into(), Rc::new(f));
        self
    }

    /// Register a handler for an event. Bound to the bus at
    /// store-initialization time, in declaration order.
    #[must_use]
    pub fn register(
        mut self,
        event: impl Into<String>,
        handler: impl FnMut(&Store, &Value) + 'static,
    ) -> Self {
        self.registers
            .push((event.into(), Rc::new(RefCell::new(handler))));
        self
    }

    /// Declare the shape that fetch-time `init_states` configuration must
    /// satisfy. Usually an object shape; validated at first fetch.
    #[must_use]
    pub fn init_states(mut self, shape: Shape) -> Self {
        self.init_states = Some(shape);
        self
    }

    /// Declare a dependency and the shape its fetch-time value must satisfy.
    #[must_use]
    pub fn dep(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.deps.insert(name.into(), shape);
        self
    }

    /// Add a computed initializer applied unconditionally at first fetch.
    #[must_use]
    pub fn init_state(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Store) -> Value + 'static,
    ) -> Self {
        self.init_state_fns.push((name.into(), Rc::new(f)));
        self
    }

    /// Add a computed initializer applied at first fetch only if the key is
    /// still unset.
    #[must_use]
    pub fn default_state(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Store) -> Value + 'static,
    ) -> Self {
        self.default_state_fns.push((name.into(), Rc::new(f)));
        self
    }

    /// Structural validation, run by the registry at `define` time.
    ///
    /// Catches the mistakes a dynamic config object used to hide: empty
    /// names anywhere, or the same event registered twice in one definition.
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        for name in self.exports.keys() {
            ensure_named("export", name)?;
        }
        for (name, _) in &self.init_state_fns {
            ensure_named("init state", name)?;
        }
        for (name, _) in &self.default_state_fns {
            ensure_named("default state", name)?;
        }
        for name in self.deps.keys() {
            ensure_named("dep", name)?;
        }
        let mut seen = std::collections::BTreeSet::new();
        for (event, _) in &self.registers {
            ensure_named("registered event", event)?;
            if !seen.insert(event.as_str()) {
                return Err(StoreError::InvalidConfiguration {
                    reason: format!("event '{event}' registered twice in one definition"),
                });
            }
        }
        Ok(())
    }
}

fn ensure_named(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidConfiguration {
            reason: format!("{kind} name must not be empty"),
        });
    }
    Ok(())
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .field(
                "registers",
                &self.registers.iter().map(|(e, _)| e).collect::<Vec<_>>(),
            )
            .field("init_states", &self.init_states)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Fetch-time configuration: concrete initial-state values and dependency
/// values, validated against the shapes the store declared.
#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    pub(crate) init_states: Option<Value>,
    pub(crate) deps: Option<Value>,
}

impl FetchConfig {
    /// An empty fetch configuration supplying nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            init_states: None,
            deps: None,
        }
    }

    /// Supply the whole `init_states` object at once.
    #[must_use]
    pub fn init_states(mut self, value: Value) -> Self {
        self.init_states = Some(value);
        self
    }

    /// Supply one initial-state value, accumulating into an object.
    #[must_use]
    pub fn init_state(mut self, name: impl Into<String>, value: Value) -> Self {
        insert_into_object(&mut self.init_states, name.into(), value);
        self
    }

    /// Supply the whole `deps` object at once.
    #[must_use]
    pub fn deps(mut self, value: Value) -> Self {
        self.deps = Some(value);
        self
    }

    /// Supply one dependency value, accumulating into an object.
    #[must_use]
    pub fn dep(mut self, name: impl Into<String>, value: Value) -> Self {
        insert_into_object(&mut self.deps, name.into(), value);
        self
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.init_states.is_none() && self.deps.is_none()
    }
}

fn insert_into_object(slot: &mut Option<Value>, name: String, value: Value) {
    match slot {
        Some(Value::Object(entries)) => {
            entries.insert(name, value);
        },
        _ => {
            let mut entries = serde_json::Map::new();
            entries.insert(name, value);
            *slot = Some(Value::Object(entries));
        },
    }
}

struct StoreBody {
    name: String,
    initialized: bool,
    states: BTreeMap<String, Value>,
    deps: BTreeMap<String, Value>,
    config: StoreConfig,
}

/// Handle to a named store.
///
/// Cheap to clone; all clones share the same state. Reads and writes go
/// through interior mutability, so `&self` methods suffice everywhere —
/// which is what lets export functions and event handlers receive the store
/// they belong to.
#[derive(Clone)]
pub struct Store {
    body: Rc<RefCell<StoreBody>>,
}

impl Store {
    pub(crate) fn new(name: impl Into<String>, config: StoreConfig) -> Self {
        Self {
            body: Rc::new(RefCell::new(StoreBody {
                name: name.into(),
                initialized: false,
                states: BTreeMap::new(),
                deps: BTreeMap::new(),
                config,
            })),
        }
    }

    /// The name this store was defined under.
    #[must_use]
    pub fn name(&self) -> String {
        self.body.borrow().name.clone()
    }

    /// Whether first-fetch initialization has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.body.borrow().initialized
    }

    /// Evaluate a declared export.
    ///
    /// The export function runs fresh on every call — nothing is memoized —
    /// so the result reflects the store's current state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UndeclaredExport`] if the store declares no
    /// export under `name`.
    pub fn get(&self, name: &str) -> Result<Value, StoreError> {
        let export = {
            let body = self.body.borrow();
            body.config.exports.get(name).cloned().ok_or_else(|| {
                StoreError::UndeclaredExport {
                    store: body.name.clone(),
                    export: name.to_string(),
                }
            })?
        };
        // Borrow released: the export is free to read and write state.
        Ok(export(self))
    }

    /// Raw read of the internal state table. `None` for unknown keys.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<Value> {
        self.body.borrow().states.get(key).cloned()
    }

    /// Unconditionally overwrite a state entry.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.body.borrow_mut().states.insert(key.into(), value);
    }

    /// Set a state entry only if it is currently absent; otherwise no-op.
    pub fn set_default(&self, key: impl Into<String>, value: Value) {
        let mut body = self.body.borrow_mut();
        body.states.entry(key.into()).or_insert(value);
    }

    /// Read a configured dependency value. `None` if never supplied.
    #[must_use]
    pub fn dep(&self, name: &str) -> Option<Value> {
        self.body.borrow().deps.get(name).cloned()
    }

    /// Apply a partial configuration to an already-initialized store.
    ///
    /// Supplied deps are validated per-key against the declared shapes and
    /// merged (shallow overwrite per key); supplied initial-state values are
    /// written straight into the state table.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfiguration`] if `deps` names a dependency
    ///   the store never declared, or a supplied section is not an object
    /// - [`StoreError::Schema`] if a dep value does not conform to its
    ///   declared shape
    pub fn config(&self, partial: FetchConfig) -> Result<(), StoreError> {
        if let Some(deps) = partial.deps {
            let entries = expect_object("deps", &deps)?;
            for (name, value) in entries {
                let declared = {
                    let body = self.body.borrow();
                    body.config.deps.get(name).cloned()
                };
                let Some(shape) = declared else {
                    return Err(StoreError::InvalidConfiguration {
                        reason: format!("store '{}' declares no dep '{name}'", self.name()),
                    });
                };
                shape.check(value)?;
                self.body
                    .borrow_mut()
                    .deps
                    .insert(name.clone(), value.clone());
            }
        }
        if let Some(states) = partial.init_states {
            let entries = expect_object("init_states", &states)?;
            for (key, value) in entries {
                self.set(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // First-fetch initialization, driven by the registry
    // ------------------------------------------------------------------

    /// Steps 1–4 of first-fetch initialization: computed defaults, computed
    /// initial values, then validated fetch-time states and deps.
    pub(crate) fn initialize(&self, supplied: &FetchConfig) -> Result<(), StoreError> {
        let config = self.body.borrow().config.clone();

        for (key, init) in &config.default_state_fns {
            let value = init(self);
            self.set_default(key.clone(), value);
        }
        for (key, init) in &config.init_state_fns {
            let value = init(self);
            self.set(key.clone(), value);
        }

        if let Some(shape) = &config.init_states {
            let states = supplied.init_states.clone().unwrap_or(Value::Null);
            shape.check(&states)?;
            if let Value::Object(entries) = states {
                for (key, value) in entries {
                    self.set(key, value);
                }
            }
        }

        if !config.deps.is_empty() {
            let declared = Shape::Object(config.deps.clone());
            let deps = supplied.deps.clone().unwrap_or(Value::Null);
            declared.check(&deps)?;
            if let Value::Object(entries) = deps {
                let mut body = self.body.borrow_mut();
                for (name, value) in entries {
                    body.deps.insert(name, value);
                }
            }
        }
        Ok(())
    }

    /// Declared handlers in declaration order, for the registry to bind.
    pub(crate) fn registers(&self) -> Vec<(String, HandlerFn)> {
        self.body.borrow().config.registers.clone()
    }

    pub(crate) fn mark_initialized(&self) {
        self.body.borrow_mut().initialized = true;
    }
}

fn expect_object<'v>(
    section: &str,
    value: &'v Value,
) -> Result<&'v serde_json::Map<String, Value>, StoreError> {
    match value {
        Value::Object(entries) => Ok(entries),
        other => Err(StoreError::InvalidConfiguration {
            reason: format!(
                "{section} must be an object, got {}",
                statebus_core::schema::json_type_name(other)
            ),
        }),
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self.body.borrow();
        f.debug_struct("Store")
            .field("name", &body.name)
            .field("initialized", &body.initialized)
            .field("states", &body.states)
            .field("deps", &body.deps.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use serde_json::json;
    use statebus_core::shape;

    fn bare_store(config: StoreConfig) -> Store {
        Store::new("store", config)
    }

    #[test]
    fn set_and_state_round_trip() {
        let store = bare_store(StoreConfig::new());
        assert_eq!(store.state("name"), None);
        store.set("name", json!("A"));
        assert_eq!(store.state("name"), Some(json!("A")));
        store.set("name", json!("B"));
        assert_eq!(store.state("name"), Some(json!("B")));
    }

    #[test]
    fn set_default_only_fills_absent_keys() {
        let store = bare_store(StoreConfig::new());
        store.set_default("name", json!("Z"));
        assert_eq!(store.state("name"), Some(json!("Z")));

        store.set("name", json!("A"));
        store.set_default("name", json!("Q"));
        assert_eq!(store.state("name"), Some(json!("A")));
    }

    #[test]
    fn get_runs_the_export_fresh_each_call() {
        let store = bare_store(
            StoreConfig::new().export("double", |store| {
                let n = store.state("n").and_then(|v| v.as_i64()).unwrap_or(0);
                json!(n * 2)
            }),
        );
        store.set("n", json!(2));
        assert_eq!(store.get("double").unwrap(), json!(4));
        store.set("n", json!(21));
        assert_eq!(store.get("double").unwrap(), json!(42));
    }

    #[test]
    fn get_rejects_undeclared_exports() {
        let store = bare_store(StoreConfig::new());
        let err = store.get("missing").unwrap_err();
        assert!(
            matches!(err, StoreError::UndeclaredExport { store, export }
                if store == "store" && export == "missing")
        );
    }

    #[test]
    fn exports_may_write_state_while_computing() {
        let store = bare_store(StoreConfig::new().export("ticks", |store| {
            let n = store.state("ticks").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            store.set("ticks", json!(n));
            json!(n)
        }));
        assert_eq!(store.get("ticks").unwrap(), json!(1));
        assert_eq!(store.get("ticks").unwrap(), json!(2));
    }

    #[test]
    fn initialize_applies_defaults_then_inits_then_supplied_states() {
        let store = bare_store(
            StoreConfig::new()
                .default_state("a", |_| json!("default"))
                .init_state("b", |_| json!("init"))
                .init_states(shape! { "c": String }),
        );
        store
            .initialize(&FetchConfig::new().init_state("c", json!("supplied")))
            .unwrap();
        assert_eq!(store.state("a"), Some(json!("default")));
        assert_eq!(store.state("b"), Some(json!("init")));
        assert_eq!(store.state("c"), Some(json!("supplied")));
    }

    #[test]
    fn initializers_see_the_store_they_initialize() {
        let store = bare_store(
            StoreConfig::new()
                .init_state("base", |_| json!(10))
                .init_state("derived", |store| {
                    let base = store.state("base").and_then(|v| v.as_i64()).unwrap_or(0);
                    json!(base * 10)
                }),
        );
        store.initialize(&FetchConfig::new()).unwrap();
        assert_eq!(store.state("derived"), Some(json!(100)));
    }

    #[test]
    fn initialize_rejects_missing_declared_init_states() {
        let store = bare_store(StoreConfig::new().init_states(shape! { "name": String }));
        let err = store.initialize(&FetchConfig::new()).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn initialize_requires_all_declared_deps() {
        let store = bare_store(StoreConfig::new().dep("Dep", shape! { "name": String }));

        let err = store.initialize(&FetchConfig::new()).unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));

        let store = bare_store(StoreConfig::new().dep("Dep", shape! { "name": String }));
        store
            .initialize(&FetchConfig::new().dep("Dep", json!({ "name": "A" })))
            .unwrap();
        assert_eq!(store.dep("Dep"), Some(json!({ "name": "A" })));
    }

    #[test]
    fn config_merges_deps_per_key_with_validation() {
        let store = bare_store(
            StoreConfig::new()
                .dep("Dep1", shape! { "name": String })
                .dep("Dep2", shape! { "score": Integer }),
        );
        store
            .initialize(
                &FetchConfig::new()
                    .dep("Dep1", json!({ "name": "Dep1" }))
                    .dep("Dep2", json!({ "score": 1000 })),
            )
            .unwrap();

        store
            .config(FetchConfig::new().dep("Dep1", json!({ "name": "Dep3" })))
            .unwrap();
        assert_eq!(store.dep("Dep1"), Some(json!({ "name": "Dep3" })));
        assert_eq!(store.dep("Dep2"), Some(json!({ "score": 1000 })));

        let err = store
            .config(FetchConfig::new().dep("Dep1", json!({ "name": 5 })))
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn config_rejects_undeclared_deps() {
        let store = bare_store(StoreConfig::new());
        let err = store
            .config(FetchConfig::new().dep("Nope", json!({})))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration { .. }));
    }

    #[test]
    fn config_overwrites_states_directly() {
        let store = bare_store(StoreConfig::new());
        store.set("name", json!("old"));
        store
            .config(FetchConfig::new().init_state("name", json!("new")))
            .unwrap();
        assert_eq!(store.state("name"), Some(json!("new")));
    }

    #[test]
    fn validate_rejects_empty_and_duplicate_names() {
        let err = StoreConfig::new()
            .export("", |_| json!(null))
            .validate()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration { .. }));

        let err = StoreConfig::new()
            .register("e", |_, _| {})
            .register("e", |_, _| {})
            .validate()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfiguration { .. }));

        assert!(StoreConfig::new().register("e", |_, _| {}).validate().is_ok());
    }
}
