//! The replicated document: one room's conflict-free map of entity field maps.
//!
//! Every entity is one key (its id). The value is the entity's flat field
//! map plus the structural fields `type`, `constraints`, `parent` and
//! `parent:order`. The page root is seeded on every replica with the same
//! genesis write, so all peers agree on it without exchanging anything.

use crate::error::Result;
use trellis_core::{FieldMap, KeyChange, MapTransaction, ReplicatedMap, Stamp, Update};
use trellis_graph::{EntityData, EntityId, Value, TYPE_FIELD};

/// Type tag of the page root.
pub const ROOT_KIND: &str = "page";

/// A batch of replicated writes, as exchanged between peers.
pub type DocUpdate = Update<Value>;

/// Replicated state of one document.
#[derive(Clone, Debug)]
pub struct ReplicatedDoc {
    room: String,
    map: ReplicatedMap<Value>,
}

impl ReplicatedDoc {
    /// Create the document for `room`, owned by `replica_id`.
    pub fn new(room: impl Into<String>, replica_id: impl Into<String>) -> Self {
        let room = room.into();
        let mut map = ReplicatedMap::new(replica_id);
        let mut fields = FieldMap::new();
        fields.insert(TYPE_FIELD.to_string(), Value::Text(ROOT_KIND.to_string()));
        map.genesis(root_key(&room), fields);
        Self { room, map }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn replica_id(&self) -> &str {
        self.map.replica_id()
    }

    /// Id of the page root shared by every replica of the room.
    pub fn root_id(&self) -> EntityId {
        Self::root_id_for(&self.room)
    }

    pub fn root_id_for(room: &str) -> EntityId {
        EntityId::from_string(root_key(room))
    }

    /// The root entity as it is created in a fresh local store.
    pub fn root_entity(&self) -> EntityData {
        EntityData::with_id(self.root_id(), ROOT_KIND)
    }

    pub fn map(&self) -> &ReplicatedMap<Value> {
        &self.map
    }

    /// Visible fields of a live entity.
    pub fn entity_fields(&self, id: &EntityId) -> Option<FieldMap<Value>> {
        self.map.get(id.as_str())
    }

    /// One visible field of a live entity.
    pub fn field(&self, id: &EntityId, field: &str) -> Option<&Value> {
        self.map.field(id.as_str(), field)
    }

    /// Stamp of the write behind a visible field.
    pub fn field_stamp(&self, id: &EntityId, field: &str) -> Option<&Stamp> {
        self.map.field_stamp(id.as_str(), field)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.map.contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn transaction(&mut self) -> MapTransaction<'_, Value> {
        self.map.transaction()
    }

    pub(crate) fn apply_update(&mut self, update: &DocUpdate) -> Vec<KeyChange> {
        self.map.apply_update(update)
    }

    pub(crate) fn merge(&mut self, state: &ReplicatedMap<Value>) -> Vec<KeyChange> {
        self.map.merge(state)
    }

    // === Wire encoding ===

    pub fn encode_update(update: &DocUpdate) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(update)?)
    }

    pub fn decode_update(bytes: &[u8]) -> Result<DocUpdate> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Full state for a late-joining peer.
    pub fn encode_state(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.map)?)
    }

    pub fn decode_state(bytes: &[u8]) -> Result<ReplicatedMap<Value>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn root_key(room: &str) -> String {
    format!("{room}:root")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_root_is_seeded_identically() {
        let a = ReplicatedDoc::new("room", "a");
        let b = ReplicatedDoc::new("room", "b");

        assert_eq!(a.root_id(), b.root_id());
        assert_eq!(a.root_id().as_str(), "room:root");
        assert_eq!(
            a.field(&a.root_id(), TYPE_FIELD),
            Some(&Value::Text(ROOT_KIND.to_string()))
        );
        assert_eq!(a.map(), b.map());
    }

    #[test]
    fn test_update_wire_round_trip_keeps_floats() {
        let mut doc = ReplicatedDoc::new("room", "a");
        let mut tx = doc.transaction();
        tx.set("x", "parent:order", Some(Value::Number(0.1 + 0.2)));
        let update = tx.commit();

        let bytes = ReplicatedDoc::encode_update(&update).unwrap();
        assert_eq!(ReplicatedDoc::decode_update(&bytes).unwrap(), update);
    }

    #[test]
    fn test_state_wire_round_trip() {
        let mut doc = ReplicatedDoc::new("room", "a");
        let mut tx = doc.transaction();
        let mut fields = FieldMap::new();
        fields.insert("type".to_string(), Value::Text("rect".to_string()));
        tx.insert("x", fields);
        let _ = tx.commit();

        let state = ReplicatedDoc::decode_state(&doc.encode_state().unwrap()).unwrap();
        assert_eq!(&state, doc.map());
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        assert!(matches!(
            ReplicatedDoc::decode_update(b"not json"),
            Err(SyncError::Serialization(_))
        ));
    }
}
