//! Entities - the nodes of the document graph.

use crate::id::EntityId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named constraint attached to an entity, e.g. "fit-to-content".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Constraint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// The content of an entity, independent of where it sits in the tree.
///
/// This is what CREATE and DELETE carry, so it must be enough to rebuild
/// the entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub id: EntityId,
    pub kind: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl EntityData {
    /// Create a new entity of type `kind` with a fresh id.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(EntityId::new(), kind)
    }

    pub fn with_id(id: EntityId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            fields: BTreeMap::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// An entity as held by the store: its data plus tree links.
///
/// `parent` and `order` are set together when the entity is attached and
/// cleared together when it is detached.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    data: EntityData,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    order: Option<f64>,
}

impl Entity {
    pub fn new(data: EntityData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            order: None,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.data.id
    }

    pub fn kind(&self) -> &str {
        &self.data.kind
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.data.fields
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.data.constraints
    }

    pub fn data(&self) -> &EntityData {
        &self.data
    }

    pub fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Order key among siblings; `None` while detached.
    pub fn order(&self) -> Option<f64> {
        self.order
    }

    pub fn is_attached(&self) -> bool {
        self.parent.is_some()
    }

    pub(crate) fn into_data(self) -> EntityData {
        self.data
    }

    pub(crate) fn fields_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.data.fields
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.children
    }

    pub(crate) fn set_link(&mut self, parent: Option<EntityId>, order: Option<f64>) {
        self.parent = parent;
        self.order = order;
    }

    pub(crate) fn set_order(&mut self, order: f64) {
        self.order = Some(order);
    }
}
