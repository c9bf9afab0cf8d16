//! # Statebus Runtime
//!
//! Runtime implementation for the statebus architecture.
//!
//! This crate provides the two collaborating facilities the system is built
//! from:
//!
//! - **Event Bus**: a synchronous publish/subscribe registry gated by a
//!   declared event schema — see [`bus`]
//! - **Store Registry**: named, lazily-initialized stores with mutable
//!   key/value state, computed exports, and event-handler bindings — see
//!   [`registry`] and [`store`]
//!
//! ## Example
//!
//! ```
//! use statebus_runtime::{StoreRegistry, StoreConfig};
//! use statebus_core::schema::EventSchema;
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let mut registry = StoreRegistry::new();
//! registry.bus_mut().define_events(
//!     EventSchema::new().declare("cart/item-added", shape! { "sku": String }),
//! );
//!
//! registry.define(
//!     "cart",
//!     StoreConfig::new()
//!         .init_state("items", |_| json!([]))
//!         .export("item_count", |store| {
//!             json!(store.state("items").and_then(|v| v.as_array().map(|a| a.len())))
//!         })
//!         .register("cart/item-added", |store, payload| {
//!             let mut items = store.state("items").unwrap_or(json!([]));
//!             if let Some(list) = items.as_array_mut() {
//!                 list.push(payload.clone());
//!             }
//!             store.set("items", items);
//!         }),
//! )?;
//!
//! let cart = registry.fetch("cart")?;
//! registry.emit("cart/item-added", &json!({ "sku": "A-1" }))?;
//! assert_eq!(cart.get("item_count")?, json!(1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// The schema-gated event bus
pub mod bus;

/// The store registry and lifecycle
pub mod registry;

/// Store handles, definitions, and accessors
pub mod store;

pub use bus::{EventBus, EventBusError, ListenerId};
pub use registry::{BindingPolicy, StoreRegistry};
pub use store::{FetchConfig, Store, StoreConfig, StoreError};
