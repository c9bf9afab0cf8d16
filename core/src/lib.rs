//! # Statebus Core
//!
//! Shape descriptors and validation for the statebus architecture.
//!
//! This crate provides the shared vocabulary of the system: dynamic values
//! (via [`serde_json::Value`]), the [`Shape`](schema::Shape) descriptors that
//! constrain them, and the [`EventSchema`](schema::EventSchema) declaring the
//! legal event universe. The runtime crate builds the event bus and store
//! registry on top of these.
//!
//! ## Core Concepts
//!
//! - **Value**: dynamic payload/state data, `serde_json::Value`
//! - **Shape**: a tagged structural descriptor (string, integer, nested
//!   object, mapping-of, ...) checked against a value at a boundary
//! - **EventSchema**: event name → payload shape; declaration is wholesale
//!
//! ## Example
//!
//! ```
//! use statebus_core::schema::EventSchema;
//! use statebus_core::shape;
//! use serde_json::json;
//!
//! let schema = EventSchema::new().declare("cart/item-added", shape! {
//!     "sku": String,
//!     "quantity": Integer,
//! });
//!
//! let shape = schema.shape("cart/item-added").ok_or("undeclared")?;
//! shape.check(&json!({ "sku": "A-1", "quantity": 2 }))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use serde_json::Value;

/// Shape descriptors, event schemas, and structural validation
pub mod schema;

/// The `shape!` declarative construction macro
mod shape_macros;
