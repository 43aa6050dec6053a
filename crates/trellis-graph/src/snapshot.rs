//! Full-graph snapshots for save/load and copy/paste.
//!
//! A [`Snapshot`] is a forest of entity subtrees. Loading one either keeps
//! the ids (document load) or assigns fresh ids to every entity (paste,
//! duplicate). References between entities of the snapshot follow the
//! remapping; references to entities outside it go through a caller-supplied
//! resolver and are dropped when it returns `None`.

use crate::entity::EntityData;
use crate::error::{GraphError, Result};
use crate::id::EntityId;
use crate::store::Store;
use crate::transaction::Txn;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One entity and its subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub entity: EntityData,
    /// Order key under the parent at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

/// How ids are assigned when a snapshot is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdMode {
    /// Keep the ids in the snapshot.
    Preserve,
    /// Give every entity a new id.
    Fresh,
}

/// A serializable forest of entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub roots: Vec<SnapshotNode>,
}

impl Snapshot {
    /// Capture the subtrees rooted at `roots`.
    pub fn serialize(store: &Store, roots: &[EntityId]) -> Result<Self> {
        let roots = roots
            .iter()
            .map(|id| capture(store, id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            roots,
        })
    }

    /// Capture the whole document, starting at the store's root.
    pub fn of_document(store: &Store) -> Result<Self> {
        let root = store
            .root()
            .ok_or_else(|| GraphError::violation("store has no root"))?;
        Self::serialize(store, std::slice::from_ref(root))
    }

    /// Number of entities in the snapshot.
    pub fn entity_count(&self) -> usize {
        fn count(node: &SnapshotNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    /// Recreate the snapshot's entities inside `txn`.
    ///
    /// Subtrees are rebuilt with their child order; the returned root ids
    /// are left detached for the caller to place.
    pub fn deserialize<F>(
        &self,
        txn: &mut Txn<'_>,
        mode: IdMode,
        mut resolve_external: F,
    ) -> Result<Vec<EntityId>>
    where
        F: FnMut(&EntityId) -> Option<EntityId>,
    {
        if self.version > SNAPSHOT_VERSION {
            return Err(GraphError::Serialization(format!(
                "unsupported snapshot version {}",
                self.version
            )));
        }

        let mut ids = HashMap::new();
        for root in &self.roots {
            assign_ids(root, mode, &mut ids);
        }

        let mut created = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            created.push(rebuild(txn, root, &ids, &mut resolve_external)?);
        }
        Ok(created)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn capture(store: &Store, id: &EntityId) -> Result<SnapshotNode> {
    let entity = store.entity(id)?;
    let children = entity
        .children()
        .iter()
        .map(|child| capture(store, child))
        .collect::<Result<Vec<_>>>()?;
    Ok(SnapshotNode {
        entity: entity.data().clone(),
        order: entity.order(),
        children,
    })
}

fn assign_ids(node: &SnapshotNode, mode: IdMode, ids: &mut HashMap<EntityId, EntityId>) {
    let id = match mode {
        IdMode::Preserve => node.entity.id.clone(),
        IdMode::Fresh => EntityId::new(),
    };
    ids.insert(node.entity.id.clone(), id);
    for child in &node.children {
        assign_ids(child, mode, ids);
    }
}

fn rebuild<F>(
    txn: &mut Txn<'_>,
    node: &SnapshotNode,
    ids: &HashMap<EntityId, EntityId>,
    resolve_external: &mut F,
) -> Result<EntityId>
where
    F: FnMut(&EntityId) -> Option<EntityId>,
{
    let mut data = node.entity.clone();
    data.id = ids
        .get(&node.entity.id)
        .cloned()
        .unwrap_or_else(|| node.entity.id.clone());
    data.fields = node
        .entity
        .fields
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Ref(target) => match ids.get(target) {
                    Some(mapped) => Value::Ref(mapped.clone()),
                    None => Value::Ref(resolve_external(target)?),
                },
                other => other.clone(),
            };
            Some((name.clone(), value))
        })
        .collect();

    let id = txn.create(data)?;
    for child in &node.children {
        let child_id = rebuild(txn, child, ids, resolve_external)?;
        match child.order.filter(|order| order.is_finite()) {
            Some(order) => txn.attach_with_order(&id, &child_id, order)?,
            None => txn.append_child(&id, &child_id)?,
        }
    }
    Ok(id)
}
