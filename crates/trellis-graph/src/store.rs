//! Object Store - the id-indexed entity arena.
//!
//! Every entity ever created and not yet deleted lives in one table keyed by
//! [`EntityId`]; parent/children links are ids, never references. One entity
//! is designated the document root.
//!
//! Structural changes go through crate-private primitives used by
//! [`Mutation::apply`](crate::mutation::Mutation::apply), which keep both
//! sides of a parent/child link in step and fire the lifecycle hooks exactly
//! once per transition.

use crate::entity::{Entity, EntityData};
use crate::error::{GraphError, Result};
use crate::id::EntityId;
use crate::order::{cmp_sibling, ORDER_FIELD};
use crate::snapshot::{IdMode, Snapshot};
use crate::transaction::Txn;
use crate::value::{Schema, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Callbacks for the rendering side, invoked synchronously while mutations
/// are applied.
pub trait LifecycleHooks: Send {
    /// An entity was inserted into a parent.
    fn on_attach(&mut self, _entity: &Entity) {}
    /// An entity was removed from its parent.
    fn on_detach(&mut self, _entity: &Entity) {}
    /// A field (or the order key) of an entity changed.
    fn on_update(&mut self, _entity: &Entity, _field: &str) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Comparable projection of one entity, see [`Store::observe`].
#[derive(Clone, Debug, PartialEq)]
pub struct EntityView {
    pub kind: String,
    pub fields: BTreeMap<String, Value>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
}

/// The document graph.
pub struct Store {
    entities: HashMap<EntityId, Entity>,
    root: Option<EntityId>,
    schema: Schema,
    hooks: Box<dyn LifecycleHooks>,
}

impl Store {
    /// Create an empty store without a root.
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            root: None,
            schema: Schema::new(),
            hooks: Box::new(NoopHooks),
        }
    }

    /// Create a store holding a single root entity.
    pub fn with_root(root: EntityData) -> Result<Self> {
        let mut store = Self::new();
        let id = root.id.clone();
        store.add_to_index(Entity::new(root))?;
        store.set_root(&id)?;
        Ok(store)
    }

    /// Load a whole document from a snapshot with exactly one root.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let [_] = snapshot.roots.as_slice() else {
            return Err(GraphError::violation(format!(
                "document snapshot must have one root, found {}",
                snapshot.roots.len()
            )));
        };

        let mut store = Self::new();
        let roots = {
            let mut txn = Txn::new(&mut store);
            let roots = snapshot.deserialize(&mut txn, IdMode::Preserve, |_| None)?;
            let _ = txn.commit();
            roots
        };
        if let Some(root) = roots.first() {
            store.set_root(root)?;
        }
        Ok(store)
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    // === Read access ===

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Like [`Store::get`], but a missing entity is an error.
    pub fn entity(&self, id: &EntityId) -> Result<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn root(&self) -> Option<&EntityId> {
        self.root.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Children of `id` in order; empty if the entity is unknown.
    pub fn children(&self, id: &EntityId) -> &[EntityId] {
        self.entities
            .get(id)
            .map(Entity::children)
            .unwrap_or_default()
    }

    /// Whether `ancestor` is `id` itself or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: &EntityId, id: &EntityId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.entities.get(cur).and_then(Entity::parent);
        }
        false
    }

    /// Index at which a child with `order` and `id` belongs among the
    /// current children of `parent` (ignoring `id` itself).
    pub fn position_for(&self, parent: &EntityId, order: f64, id: &EntityId) -> Result<usize> {
        let siblings = self.entity(parent)?.children();
        let before = |sib: &EntityId| {
            cmp_sibling((self.order_of(sib), sib), (order, id)) == Ordering::Less
        };
        let index = siblings.partition_point(|sib| before(sib));
        // `id` may already be listed under its current key
        let listed_before = self
            .entities
            .get(id)
            .is_some_and(|entity| entity.parent() == Some(parent) && before(id));
        Ok(index - usize::from(listed_before))
    }

    fn order_of(&self, id: &EntityId) -> f64 {
        self.entities
            .get(id)
            .and_then(Entity::order)
            .unwrap_or(f64::NAN)
    }

    /// Every `(entity, field)` holding a reference to `target`, sorted.
    pub fn referrers(&self, target: &EntityId) -> Vec<(EntityId, String)> {
        let mut found: Vec<(EntityId, String)> = self
            .entities
            .values()
            .flat_map(|entity| {
                entity
                    .fields()
                    .iter()
                    .filter(|(_, value)| value.as_ref_id() == Some(target))
                    .map(move |(field, _)| (entity.id().clone(), field.clone()))
            })
            .collect();
        found.sort();
        found
    }

    /// Lazy depth-first (pre-order) walk starting at `from`.
    ///
    /// Each call starts a fresh walk; an unknown start yields nothing.
    pub fn traverse(&self, from: &EntityId) -> Traverse<'_> {
        let stack = if self.contains(from) {
            vec![from.clone()]
        } else {
            Vec::new()
        };
        Traverse { store: self, stack }
    }

    /// First entity in depth-first order under `from` matching `pred`.
    pub fn find_first<P>(&self, from: &EntityId, mut pred: P) -> Option<&Entity>
    where
        P: FnMut(&Entity) -> bool,
    {
        self.traverse(from).find(|e| pred(e))
    }

    // === Index maintenance ===

    /// Set the document root. The root must be indexed and detached.
    pub fn set_root(&mut self, id: &EntityId) -> Result<()> {
        let entity = self.entity(id)?;
        if entity.is_attached() {
            return Err(GraphError::violation(format!(
                "root {id} must not have a parent"
            )));
        }
        self.root = Some(id.clone());
        Ok(())
    }

    /// Add an entity to the index. This has no tree side effects; callers
    /// keep the parent/children links consistent themselves.
    pub fn add_to_index(&mut self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(entity.id()) {
            return Err(GraphError::AlreadyExists(entity.id().clone()));
        }
        self.entities.insert(entity.id().clone(), entity);
        Ok(())
    }

    /// Remove an entity from the index. This has no tree side effects.
    pub fn remove_from_index(&mut self, id: &EntityId) -> Result<Entity> {
        let entity = self
            .entities
            .remove(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;
        if self.root.as_ref() == Some(id) {
            self.root = None;
        }
        Ok(entity)
    }

    // === Structural primitives ===

    /// Drop a detached, childless entity from the index.
    pub(crate) fn destroy(&mut self, id: &EntityId) -> Result<EntityData> {
        let entity = self.entity(id)?;
        if entity.is_attached() || !entity.children().is_empty() {
            return Err(GraphError::violation(format!(
                "cannot delete {id}: still attached or has children"
            )));
        }
        if self.root.as_ref() == Some(id) {
            return Err(GraphError::violation(format!("cannot delete root {id}")));
        }
        Ok(self.remove_from_index(id)?.into_data())
    }

    /// Attach `child` under `parent` at the slot implied by `order`.
    /// Returns the index it landed at.
    pub(crate) fn link_child(
        &mut self,
        parent: &EntityId,
        child: &EntityId,
        order: f64,
    ) -> Result<usize> {
        let index = self.position_for(parent, order, child)?;
        self.entity(child)?;

        if let Some(p) = self.entities.get_mut(parent) {
            p.children_mut().insert(index, child.clone());
        }
        if let Some(c) = self.entities.get_mut(child) {
            c.set_link(Some(parent.clone()), Some(order));
        }
        if let Some(c) = self.entities.get(child) {
            self.hooks.on_attach(c);
        }
        Ok(index)
    }

    /// Detach `child` from `parent`. Returns the index it was at.
    pub(crate) fn unlink_child(&mut self, parent: &EntityId, child: &EntityId) -> Result<usize> {
        self.entity(child)?;
        let p = self
            .entities
            .get_mut(parent)
            .ok_or_else(|| GraphError::EntityNotFound(parent.clone()))?;
        let index = p
            .children()
            .iter()
            .position(|c| c == child)
            .ok_or_else(|| GraphError::violation(format!("{child} is not a child of {parent}")))?;
        p.children_mut().remove(index);

        if let Some(c) = self.entities.get_mut(child) {
            c.set_link(None, None);
        }
        if let Some(c) = self.entities.get(child) {
            self.hooks.on_detach(c);
        }
        Ok(index)
    }

    /// Give an attached child a new order key and move it to the matching
    /// slot.
    pub(crate) fn reposition_child(
        &mut self,
        parent: &EntityId,
        child: &EntityId,
        order: f64,
    ) -> Result<usize> {
        let p = self
            .entities
            .get_mut(parent)
            .ok_or_else(|| GraphError::EntityNotFound(parent.clone()))?;
        let from = p
            .children()
            .iter()
            .position(|c| c == child)
            .ok_or_else(|| GraphError::violation(format!("{child} is not a child of {parent}")))?;
        p.children_mut().remove(from);

        let index = self.position_for(parent, order, child)?;
        if let Some(p) = self.entities.get_mut(parent) {
            p.children_mut().insert(index, child.clone());
        }
        if let Some(c) = self.entities.get_mut(child) {
            c.set_order(order);
        }
        if let Some(c) = self.entities.get(child) {
            self.hooks.on_update(c, ORDER_FIELD);
        }
        Ok(index)
    }

    /// Write a field (`Null` removes it). Returns the previous value.
    pub(crate) fn write_field(&mut self, id: &EntityId, field: &str, value: Value) -> Result<Value> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| GraphError::EntityNotFound(id.clone()))?;
        let old = if value.is_null() {
            entity.fields_mut().remove(field)
        } else {
            entity.fields_mut().insert(field.to_string(), value)
        };
        if let Some(e) = self.entities.get(id) {
            self.hooks.on_update(e, field);
        }
        Ok(old.unwrap_or(Value::Null))
    }

    // === Verification ===

    /// Verify the structural invariants:
    /// - `parent.children` contains `child` iff `child.parent == parent`
    /// - every child is indexed and carries an order key
    /// - siblings are strictly ascending by `(order, id)`
    /// - the root, if any, is indexed and detached
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(root) = &self.root {
            if self.entity(root)?.is_attached() {
                return Err(GraphError::violation(format!("root {root} has a parent")));
            }
        }

        for (id, entity) in &self.entities {
            if let Some(parent) = entity.parent() {
                let p = self.entities.get(parent).ok_or_else(|| {
                    GraphError::violation(format!("{id} points at missing parent {parent}"))
                })?;
                if !p.children().contains(id) {
                    return Err(GraphError::violation(format!(
                        "{id} claims parent {parent}, which does not list it"
                    )));
                }
                if entity.order().is_none() {
                    return Err(GraphError::violation(format!("attached {id} has no order key")));
                }
            }

            let mut previous: Option<(f64, &EntityId)> = None;
            for child in entity.children() {
                let c = self.entities.get(child).ok_or_else(|| {
                    GraphError::violation(format!("{id} lists missing child {child}"))
                })?;
                if c.parent() != Some(id) {
                    return Err(GraphError::violation(format!(
                        "{id} lists {child}, whose parent is {:?}",
                        c.parent()
                    )));
                }
                let key = (c.order().unwrap_or(f64::NAN), child);
                if let Some(prev) = previous {
                    if cmp_sibling(prev, key) != Ordering::Less {
                        return Err(GraphError::violation(format!(
                            "children of {id} are not ascending at {child}"
                        )));
                    }
                }
                previous = Some(key);
            }
        }
        Ok(())
    }

    /// Comparable view of every indexed entity.
    pub fn observe(&self) -> BTreeMap<EntityId, EntityView> {
        self.entities
            .iter()
            .map(|(id, e)| {
                let view = EntityView {
                    kind: e.kind().to_string(),
                    fields: e.fields().clone(),
                    parent: e.parent().cloned(),
                    children: e.children().to_vec(),
                };
                (id.clone(), view)
            })
            .collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first iterator returned by [`Store::traverse`].
pub struct Traverse<'a> {
    store: &'a Store,
    stack: Vec<EntityId>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Entity;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(entity) = self.store.get(&id) {
                self.stack.extend(entity.children().iter().rev().cloned());
                return Some(entity);
            }
        }
        None
    }
}
