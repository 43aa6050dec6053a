//! Work waiting for an entity that has not arrived yet.
//!
//! Replication gives no delivery order across peers, so a reference or a
//! `parent` field can name an entity this replica has not seen. Such a field
//! is resolved to absent and parked here under the missing id; when that id
//! later materializes, the parked fields are reconciled again.

use std::collections::HashMap;
use trellis_graph::EntityId;

/// Parked reference fields and attachments, keyed by the missing entity.
#[derive(Clone, Debug, Default)]
pub struct PendingRefs {
    /// target -> (holder, field)
    refs: HashMap<EntityId, Vec<(EntityId, String)>>,
    /// parent -> children
    children: HashMap<EntityId, Vec<EntityId>>,
}

impl PendingRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `holder.field`, which references the missing `target`.
    pub fn park_ref(&mut self, target: &EntityId, holder: &EntityId, field: &str) {
        let waiting = self.refs.entry(target.clone()).or_default();
        if !waiting.iter().any(|(h, f)| h == holder && f == field) {
            waiting.push((holder.clone(), field.to_string()));
        }
    }

    /// Park `child`, whose parent is the missing `parent`.
    pub fn park_child(&mut self, parent: &EntityId, child: &EntityId) {
        let waiting = self.children.entry(parent.clone()).or_default();
        if !waiting.contains(child) {
            waiting.push(child.clone());
        }
    }

    /// Everything waiting for `id`, removed from the queue.
    pub fn take(&mut self, id: &EntityId) -> (Vec<(EntityId, String)>, Vec<EntityId>) {
        (
            self.refs.remove(id).unwrap_or_default(),
            self.children.remove(id).unwrap_or_default(),
        )
    }

    pub fn is_waiting_for(&self, id: &EntityId) -> bool {
        self.refs.contains_key(id) || self.children.contains_key(id)
    }

    /// Number of parked entries.
    pub fn len(&self) -> usize {
        self.refs.values().map(Vec::len).sum::<usize>()
            + self.children.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.children.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
        self.children.clear();
    }
}
