// File: `crates/trellis-graph/src/lib.rs`
//! # trellis-graph
//!
//! The document graph behind Trellis.
//!
//! This crate provides:
//! - An id-indexed entity store with ordered children and lifecycle hooks
//! - Invertible, idempotent mutations batched into transactions
//! - Fractional order keys for sibling order
//! - Undo/redo history of named actions, with action merging
//! - A constraint resolution engine with bounded fixpoint iteration
//! - Snapshots for save/load and copy/paste
//! - An `Editor` tying these together for local edits
//!
//! ## Example
//!
//! ```rust,ignore
//! use trellis_graph::{Editor, EntityData, Store};
//!
//! let store = Store::with_root(EntityData::new("page"))?;
//! let root = store.root().cloned().unwrap();
//! let mut editor = Editor::with_store(store);
//!
//! let shape = editor.transact(|txn| {
//!     let id = txn.create(EntityData::new("rect").with_field("width", 120.0))?;
//!     txn.append_child(&root, &id)?;
//!     Ok(id)
//! })?;
//!
//! editor.undo()?;
//! assert!(!editor.store().contains(&shape));
//! ```

pub mod config;
pub mod constraint;
pub mod editor;
pub mod entity;
pub mod error;
pub mod history;
pub mod id;
pub mod mutation;
pub mod order;
pub mod snapshot;
pub mod store;
pub mod transaction;
pub mod value;

// Store exports
pub use entity::{Constraint, Entity, EntityData};
pub use id::EntityId;
pub use store::{EntityView, LifecycleHooks, NoopHooks, Store, Traverse};
pub use value::{
    FieldKind, Schema, TypeSchema, Value, CONSTRAINTS_FIELD, PARENT_FIELD, RESERVED_FIELDS, TYPE_FIELD,
};

// Mutation exports
pub use mutation::{Applied, Mutation};
pub use order::{key_between, ORDER_FIELD};
pub use transaction::{Transaction, Txn};

// History exports
pub use history::{Action, ActionId, History};

// Constraint exports
pub use constraint::{ConstraintEngine, ConstraintRegistry, Resolution, ResolveError, Resolver};

// Persistence exports
pub use snapshot::{IdMode, Snapshot, SnapshotNode};

// Editor exports
pub use config::{EditorConfig, EditorConfigBuilder};
pub use editor::Editor;

// Error exports
pub use error::{GraphError, Result};
