//! Mutations - the single vocabulary for every change to the graph.
//!
//! Local edits, undo/redo and remote replay all go through
//! [`Mutation::apply`]. Each mutation carries its "old" side so it can be
//! inverted without looking at the store, and `apply` checks the current
//! state first so that replaying a mutation whose effect is already present
//! is a silent no-op.

use crate::entity::{Entity, EntityData};
use crate::error::{GraphError, Result};
use crate::id::EntityId;
use crate::store::Store;
use crate::value::{is_reserved, FieldKind, Value};
use serde::{Deserialize, Serialize};

/// Outcome of applying a mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The store changed.
    Changed,
    /// The effect was already present; nothing happened.
    AlreadyApplied,
}

/// One invertible edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Add a detached entity to the index.
    Create { entity: EntityData },
    /// Drop a detached, childless entity. Carries its content at deletion.
    Delete { entity: EntityData },
    /// Overwrite an ordinary field. `Null` means absent.
    Assign {
        id: EntityId,
        field: String,
        old: Value,
        new: Value,
    },
    /// Overwrite a reference field.
    AssignRef {
        id: EntityId,
        field: String,
        old: Option<EntityId>,
        new: Option<EntityId>,
    },
    /// Attach `child` under `parent` with order key `order`.
    InsertChild {
        parent: EntityId,
        child: EntityId,
        position: usize,
        order: f64,
    },
    /// Detach `child` from `parent`; `position` and `order` are where it was.
    RemoveChild {
        parent: EntityId,
        child: EntityId,
        position: usize,
        order: f64,
    },
    /// Move `child` among its siblings by giving it a new order key.
    ReorderChild {
        parent: EntityId,
        child: EntityId,
        from: usize,
        to: usize,
        old_order: f64,
        new_order: f64,
    },
}

impl Mutation {
    /// The logical opposite of this mutation.
    pub fn inverse(&self) -> Mutation {
        match self {
            Mutation::Create { entity } => Mutation::Delete {
                entity: entity.clone(),
            },
            Mutation::Delete { entity } => Mutation::Create {
                entity: entity.clone(),
            },
            Mutation::Assign { id, field, old, new } => Mutation::Assign {
                id: id.clone(),
                field: field.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Mutation::AssignRef { id, field, old, new } => Mutation::AssignRef {
                id: id.clone(),
                field: field.clone(),
                old: new.clone(),
                new: old.clone(),
            },
            Mutation::InsertChild {
                parent,
                child,
                position,
                order,
            } => Mutation::RemoveChild {
                parent: parent.clone(),
                child: child.clone(),
                position: *position,
                order: *order,
            },
            Mutation::RemoveChild {
                parent,
                child,
                position,
                order,
            } => Mutation::InsertChild {
                parent: parent.clone(),
                child: child.clone(),
                position: *position,
                order: *order,
            },
            Mutation::ReorderChild {
                parent,
                child,
                from,
                to,
                old_order,
                new_order,
            } => Mutation::ReorderChild {
                parent: parent.clone(),
                child: child.clone(),
                from: *to,
                to: *from,
                old_order: *new_order,
                new_order: *old_order,
            },
        }
    }

    /// The entity this mutation is about (the child for structural ones).
    pub fn subject(&self) -> &EntityId {
        match self {
            Mutation::Create { entity } | Mutation::Delete { entity } => &entity.id,
            Mutation::Assign { id, .. } | Mutation::AssignRef { id, .. } => id,
            Mutation::InsertChild { child, .. }
            | Mutation::RemoveChild { child, .. }
            | Mutation::ReorderChild { child, .. } => child,
        }
    }

    /// Apply to the store.
    pub fn apply(&self, store: &mut Store) -> Result<Applied> {
        match self {
            Mutation::Create { entity } => apply_create(store, entity),
            Mutation::Delete { entity } => {
                if !store.contains(&entity.id) {
                    return Ok(Applied::AlreadyApplied);
                }
                store.destroy(&entity.id)?;
                Ok(Applied::Changed)
            }
            Mutation::Assign { id, field, new, .. } => apply_assign(store, id, field, new),
            Mutation::AssignRef { id, field, new, .. } => {
                let kind = store.entity(id)?.kind().to_string();
                if is_reserved(field) {
                    return Err(GraphError::ReservedField(field.clone()));
                }
                if let Some(expected) = store.schema().get(&kind).and_then(|t| t.kind_of(field)) {
                    if !expected.accepts(FieldKind::Ref) {
                        return Err(GraphError::TypeMismatch {
                            field: field.clone(),
                            expected: expected.to_string(),
                            found: FieldKind::Ref.to_string(),
                        });
                    }
                }
                let value = new.clone().map(Value::Ref).unwrap_or(Value::Null);
                write_if_changed(store, id, field, value)
            }
            Mutation::InsertChild {
                parent,
                child,
                order,
                ..
            } => apply_insert(store, parent, child, *order),
            Mutation::RemoveChild { parent, child, .. } => {
                store.entity(parent)?;
                let listed = store.children(parent).contains(child);
                let linked = store.entity(child)?.parent() == Some(parent);
                match (listed, linked) {
                    (false, false) => Ok(Applied::AlreadyApplied),
                    (true, true) => {
                        store.unlink_child(parent, child)?;
                        Ok(Applied::Changed)
                    }
                    _ => Err(GraphError::violation(format!(
                        "one-sided link between {parent} and {child}"
                    ))),
                }
            }
            Mutation::ReorderChild {
                parent,
                child,
                new_order,
                ..
            } => {
                let c = store.entity(child)?;
                if c.parent() != Some(parent) {
                    return Err(GraphError::violation(format!(
                        "cannot reorder {child}: not a child of {parent}"
                    )));
                }
                if !new_order.is_finite() {
                    return Err(GraphError::violation(format!(
                        "order key for {child} is not finite"
                    )));
                }
                if c.order() == Some(*new_order) {
                    return Ok(Applied::AlreadyApplied);
                }
                store.reposition_child(parent, child, *new_order)?;
                Ok(Applied::Changed)
            }
        }
    }
}

fn apply_create(store: &mut Store, entity: &EntityData) -> Result<Applied> {
    if store.contains(&entity.id) {
        return Ok(Applied::AlreadyApplied);
    }
    for (field, value) in &entity.fields {
        store.schema().validate(&entity.kind, field, value)?;
    }
    store.add_to_index(Entity::new(entity.clone()))?;
    Ok(Applied::Changed)
}

fn apply_assign(store: &mut Store, id: &EntityId, field: &str, new: &Value) -> Result<Applied> {
    let kind = store.entity(id)?.kind().to_string();
    if matches!(new, Value::Ref(_)) {
        return Err(GraphError::TypeMismatch {
            field: field.to_string(),
            expected: "a non-reference value (use a reference assignment)".to_string(),
            found: FieldKind::Ref.to_string(),
        });
    }
    store.schema().validate(&kind, field, new)?;
    write_if_changed(store, id, field, new.clone())
}

fn write_if_changed(store: &mut Store, id: &EntityId, field: &str, value: Value) -> Result<Applied> {
    let current = store.entity(id)?.field(field).unwrap_or(&Value::Null);
    if *current == value {
        return Ok(Applied::AlreadyApplied);
    }
    store.write_field(id, field, value)?;
    Ok(Applied::Changed)
}

fn apply_insert(store: &mut Store, parent: &EntityId, child: &EntityId, order: f64) -> Result<Applied> {
    store.entity(parent)?;
    let listed = store.children(parent).contains(child);
    let current_parent = store.entity(child)?.parent().cloned();

    match (&current_parent, listed) {
        (Some(p), true) if p == parent => return Ok(Applied::AlreadyApplied),
        (Some(p), false) if p != parent => {
            return Err(GraphError::violation(format!(
                "{child} is already attached to {p}"
            )));
        }
        (None, false) => {}
        _ => {
            return Err(GraphError::violation(format!(
                "one-sided link between {parent} and {child}"
            )));
        }
    }

    if store.is_ancestor(child, parent) {
        return Err(GraphError::violation(format!(
            "attaching {child} under {parent} would create a cycle"
        )));
    }
    if store.root() == Some(child) {
        return Err(GraphError::violation(format!("root {child} cannot be attached")));
    }
    if !order.is_finite() {
        return Err(GraphError::violation(format!(
            "order key for {child} is not finite"
        )));
    }

    store.link_child(parent, child, order)?;
    Ok(Applied::Changed)
}
