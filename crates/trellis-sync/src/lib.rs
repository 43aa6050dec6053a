// File: `crates/trellis-sync/src/lib.rs`
//! # trellis-sync
//!
//! Replication for Trellis documents. Every peer keeps its own document
//! graph and a conflict-free replicated map of the same content; the two are
//! kept in step by the [`Bridge`].
//!
//! - [`doc`] - the room's replicated document and its wire encoding
//! - [`bridge`] - local transactions to replicated updates and back
//! - [`pending`] - references and attachments waiting for a missing entity
//! - [`network`] - transport abstraction and an in-memory implementation
//! - [`session`] - an editor, a bridge and a transport working together
//! - [`config`] - replication settings
//! - [`error`] - error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_sync::{create_network, Session, SyncConfigBuilder};
//!
//! let mut peers = create_network(2).into_iter();
//! let config = SyncConfigBuilder::new().room("board").replica_id("alice").build();
//! let mut alice = Session::new(Arc::new(peers.next().unwrap()), config)?;
//!
//! alice.editor_mut().transact(|txn| txn.assign(&root, "title", "Plan"))?;
//! alice.flush().await?;
//! ```

pub mod bridge;
pub mod config;
pub mod doc;
pub mod error;
pub mod network;
pub mod pending;
pub mod session;

pub use bridge::{Bridge, RemoteReport};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use doc::{DocUpdate, ReplicatedDoc, ROOT_KIND};
pub use error::{Result, SyncError};
pub use network::{
    create_network, MemoryNetwork, MemoryTransport, Message, MessageReceiver, NetworkError,
    NetworkTransport, PeerId,
};
pub use pending::PendingRefs;
pub use session::{Session, SessionEvent};
