//! Transactions - ordered batches of mutations.
//!
//! A [`Transaction`] is the record: it can be applied, inverted and replayed.
//! A [`Txn`] is the live form used while editing: every mutation is applied
//! to the store as soon as it is recorded, so later steps (and constraint
//! resolvers) read current state. Committing a `Txn` yields the record.

use crate::entity::EntityData;
use crate::error::{GraphError, Result};
use crate::id::EntityId;
use crate::mutation::{Applied, Mutation};
use crate::order::{key_between, respaced};
use crate::store::Store;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An ordered sequence of mutations produced by one edit step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mutations(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Apply every mutation in order.
    ///
    /// If one fails, the mutations this call already changed are reverted
    /// and the error is returned, leaving the store as it was.
    pub fn apply(&self, store: &mut Store) -> Result<()> {
        self.apply_effective(store).map(|_| ())
    }

    /// Like [`Transaction::apply`], returning only the mutations that
    /// changed the store. This is what must be replicated when replaying
    /// against a store that may already contain part of the effect.
    pub fn apply_effective(&self, store: &mut Store) -> Result<Transaction> {
        let mut changed: Vec<&Mutation> = Vec::new();
        for mutation in &self.mutations {
            match mutation.apply(store) {
                Ok(Applied::Changed) => changed.push(mutation),
                Ok(Applied::AlreadyApplied) => {}
                Err(err) => {
                    undo_applied(store, changed.into_iter().rev());
                    return Err(err);
                }
            }
        }
        Ok(Transaction {
            mutations: changed.into_iter().cloned().collect(),
        })
    }

    /// Apply what can be applied: failing mutations are logged and skipped.
    /// Returns how many were skipped.
    pub fn apply_lenient(&self, store: &mut Store) -> usize {
        let mut skipped = 0;
        for mutation in &self.mutations {
            if let Err(err) = mutation.apply(store) {
                warn!(entity = %mutation.subject(), error = %err, "skipping mutation");
                skipped += 1;
            }
        }
        skipped
    }

    /// The transaction that undoes this one: inverses in reverse order.
    pub fn invert(&self) -> Transaction {
        Transaction {
            mutations: self.mutations.iter().rev().map(Mutation::inverse).collect(),
        }
    }

    /// Apply the inverse of this transaction.
    pub fn revert(&self, store: &mut Store) -> Result<()> {
        self.invert().apply(store)
    }
}

fn undo_applied<'a>(store: &mut Store, applied: impl Iterator<Item = &'a Mutation>) {
    for mutation in applied {
        if let Err(err) = mutation.inverse().apply(store) {
            warn!(entity = %mutation.subject(), error = %err, "rollback step failed");
        }
    }
}

/// A live transaction over a store.
///
/// Only mutations that changed the store are recorded, so the committed
/// [`Transaction`] replays and inverts exactly what happened.
pub struct Txn<'s> {
    store: &'s mut Store,
    mutations: Vec<Mutation>,
}

impl<'s> Txn<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            mutations: Vec::new(),
        }
    }

    /// Read access to the current (in-transaction) state.
    pub fn store(&self) -> &Store {
        &*self.store
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Apply a mutation and record it if it changed anything.
    pub fn apply(&mut self, mutation: Mutation) -> Result<Applied> {
        let applied = mutation.apply(self.store)?;
        if applied == Applied::Changed {
            self.mutations.push(mutation);
        }
        Ok(applied)
    }

    // === Entity lifecycle ===

    /// Create a detached entity.
    pub fn create(&mut self, entity: EntityData) -> Result<EntityId> {
        if self.store.contains(&entity.id) {
            return Err(GraphError::AlreadyExists(entity.id));
        }
        let id = entity.id.clone();
        self.apply(Mutation::Create { entity })?;
        Ok(id)
    }

    /// Delete a detached, childless entity.
    ///
    /// References to it held by other entities are cleared first, so no
    /// reference outlives its target.
    pub fn delete(&mut self, id: &EntityId) -> Result<()> {
        self.store.entity(id)?;
        for (holder, field) in self.store.referrers(id) {
            if holder != *id {
                self.assign_ref(&holder, &field, None)?;
            }
        }
        let entity = self.store.entity(id)?.data().clone();
        self.apply(Mutation::Delete { entity })?;
        Ok(())
    }

    /// Detach an entity and delete it together with its whole subtree.
    pub fn delete_subtree(&mut self, id: &EntityId) -> Result<()> {
        if let Some(parent) = self.store.entity(id)?.parent().cloned() {
            self.remove_child(&parent, id)?;
        }
        self.delete_detached(id)
    }

    fn delete_detached(&mut self, id: &EntityId) -> Result<()> {
        let children = self.store.children(id).to_vec();
        for child in children.iter().rev() {
            self.remove_child(id, child)?;
            self.delete_detached(child)?;
        }
        self.delete(id)
    }

    // === Fields ===

    /// Set an ordinary field (`Null` clears it). Returns whether it changed.
    ///
    /// A reference held by the field is cleared with its own reference
    /// mutation first, so the recorded steps invert back to the reference.
    pub fn assign(&mut self, id: &EntityId, field: &str, value: impl Into<Value>) -> Result<bool> {
        let new = value.into();
        let current = self.current(id, field)?;
        let (cleared, old) = match current {
            Value::Ref(target) => {
                let cleared = self.apply(Mutation::AssignRef {
                    id: id.clone(),
                    field: field.to_string(),
                    old: Some(target),
                    new: None,
                })?;
                (cleared == Applied::Changed, Value::Null)
            }
            other => (false, other),
        };
        let applied = self.apply_or_undo(
            Mutation::Assign {
                id: id.clone(),
                field: field.to_string(),
                old,
                new,
            },
            cleared,
        )?;
        Ok(cleared || applied == Applied::Changed)
    }

    /// Point a reference field at `target` (or clear it with `None`).
    ///
    /// An ordinary value held by the field is cleared with its own
    /// assignment first, so undo restores it.
    pub fn assign_ref(
        &mut self,
        id: &EntityId,
        field: &str,
        target: Option<&EntityId>,
    ) -> Result<bool> {
        if let Some(target) = target {
            self.store.entity(target)?;
        }
        let (cleared, old) = match self.current(id, field)? {
            Value::Ref(old) => (false, Some(old)),
            Value::Null => (false, None),
            plain => {
                let cleared = self.apply(Mutation::Assign {
                    id: id.clone(),
                    field: field.to_string(),
                    old: plain,
                    new: Value::Null,
                })?;
                (cleared == Applied::Changed, None)
            }
        };
        let applied = self.apply_or_undo(
            Mutation::AssignRef {
                id: id.clone(),
                field: field.to_string(),
                old,
                new: target.cloned(),
            },
            cleared,
        )?;
        Ok(cleared || applied == Applied::Changed)
    }

    fn current(&self, id: &EntityId, field: &str) -> Result<Value> {
        Ok(self
            .store
            .entity(id)?
            .field(field)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Apply `mutation`; if it fails and `staged` says the previous step
    /// changed the store, take that step back out.
    fn apply_or_undo(&mut self, mutation: Mutation, staged: bool) -> Result<Applied> {
        match self.apply(mutation) {
            Ok(applied) => Ok(applied),
            Err(err) => {
                if staged {
                    if let Some(previous) = self.mutations.pop() {
                        undo_applied(self.store, std::iter::once(&previous));
                    }
                }
                Err(err)
            }
        }
    }

    // === Structure ===

    /// Attach a detached `child` under `parent` at `position`.
    ///
    /// The order key is the midpoint between the neighbors at `position`.
    /// If no key fits between them, the siblings are first re-spaced.
    pub fn insert_child(&mut self, parent: &EntityId, child: &EntityId, position: usize) -> Result<()> {
        self.store.entity(parent)?;
        let c = self.store.entity(child)?;
        if let Some(current) = c.parent() {
            return Err(GraphError::violation(format!(
                "{child} is already attached to {current}"
            )));
        }
        if self.store.is_ancestor(child, parent) {
            return Err(GraphError::violation(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }
        let length = self.store.children(parent).len();
        if position > length {
            return Err(GraphError::IndexOutOfBounds {
                index: position,
                length,
            });
        }

        let siblings = self.store.children(parent).to_vec();
        let order = match self.key_at(&siblings, position) {
            Some(order) => order,
            None => {
                self.respace(parent, &siblings)?;
                self.key_at(&siblings, position).ok_or_else(|| {
                    GraphError::violation(format!("no order key fits under {parent}"))
                })?
            }
        };

        self.apply(Mutation::InsertChild {
            parent: parent.clone(),
            child: child.clone(),
            position,
            order,
        })?;
        Ok(())
    }

    /// Attach a detached `child` under `parent` with a key it already had,
    /// e.g. when a saved document is loaded.
    pub(crate) fn attach_with_order(&mut self, parent: &EntityId, child: &EntityId, order: f64) -> Result<()> {
        let position = self.store.position_for(parent, order, child)?;
        self.apply(Mutation::InsertChild {
            parent: parent.clone(),
            child: child.clone(),
            position,
            order,
        })?;
        Ok(())
    }

    /// Attach `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: &EntityId, child: &EntityId) -> Result<()> {
        let position = self.store.entity(parent)?.children().len();
        self.insert_child(parent, child, position)
    }

    /// Detach `child` from `parent`.
    pub fn remove_child(&mut self, parent: &EntityId, child: &EntityId) -> Result<()> {
        let c = self.store.entity(child)?;
        if c.parent() != Some(parent) {
            return Err(GraphError::violation(format!(
                "{child} is not a child of {parent}"
            )));
        }
        let order = c.order().unwrap_or_default();
        let position = self
            .store
            .children(parent)
            .iter()
            .position(|id| id == child)
            .ok_or_else(|| GraphError::violation(format!("{parent} does not list {child}")))?;

        self.apply(Mutation::RemoveChild {
            parent: parent.clone(),
            child: child.clone(),
            position,
            order,
        })?;
        Ok(())
    }

    /// Move `child` to index `to` among its siblings.
    pub fn reorder_child(&mut self, parent: &EntityId, child: &EntityId, to: usize) -> Result<()> {
        let siblings = self.store.children(parent).to_vec();
        let from = siblings
            .iter()
            .position(|id| id == child)
            .ok_or_else(|| GraphError::violation(format!("{child} is not a child of {parent}")))?;
        let others: Vec<EntityId> = siblings.iter().filter(|id| *id != child).cloned().collect();
        if to > others.len() {
            return Err(GraphError::IndexOutOfBounds {
                index: to,
                length: others.len(),
            });
        }
        if to == from {
            return Ok(());
        }

        let new_order = match self.key_at(&others, to) {
            Some(order) => order,
            None => {
                self.respace(parent, &siblings)?;
                self.key_at(&others, to).ok_or_else(|| {
                    GraphError::violation(format!("no order key fits under {parent}"))
                })?
            }
        };
        let old_order = self.store.entity(child)?.order().unwrap_or_default();

        self.apply(Mutation::ReorderChild {
            parent: parent.clone(),
            child: child.clone(),
            from,
            to,
            old_order,
            new_order,
        })?;
        Ok(())
    }

    /// Reparent `child` to `parent` at `position` (index in the new parent's
    /// children after the child has been detached).
    pub fn move_to(&mut self, child: &EntityId, parent: &EntityId, position: usize) -> Result<()> {
        self.store.entity(parent)?;
        if self.store.is_ancestor(child, parent) {
            return Err(GraphError::violation(format!(
                "moving {child} under {parent} would create a cycle"
            )));
        }
        if let Some(current) = self.store.entity(child)?.parent().cloned() {
            self.remove_child(&current, child)?;
        }
        self.insert_child(parent, child, position)
    }

    /// Key for a new sibling at `position` in `siblings`.
    fn key_at(&self, siblings: &[EntityId], position: usize) -> Option<f64> {
        let order_of = |index: Option<usize>| {
            index
                .and_then(|i| siblings.get(i))
                .and_then(|id| self.store.get(id))
                .and_then(|e| e.order())
        };
        key_between(order_of(position.checked_sub(1)), order_of(Some(position)))
    }

    /// Give `siblings` evenly spaced keys, keeping their current order.
    fn respace(&mut self, parent: &EntityId, siblings: &[EntityId]) -> Result<()> {
        for (index, (id, order)) in siblings.iter().zip(respaced(siblings.len())).enumerate() {
            let old_order = self.store.entity(id)?.order().unwrap_or_default();
            self.apply(Mutation::ReorderChild {
                parent: parent.clone(),
                child: id.clone(),
                from: index,
                to: index,
                old_order,
                new_order: order,
            })?;
        }
        Ok(())
    }

    // === Completion ===

    /// Finish the transaction and return its record.
    pub fn commit(self) -> Transaction {
        Transaction {
            mutations: self.mutations,
        }
    }

    /// Revert everything this transaction applied.
    pub fn rollback(self) -> Result<()> {
        Transaction::from_mutations(self.mutations).revert(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Store {
        Store::with_root(EntityData::with_id("root".into(), "page")).unwrap()
    }

    fn root() -> EntityId {
        "root".into()
    }

    fn orders(store: &Store, parent: &EntityId) -> Vec<f64> {
        store
            .children(parent)
            .iter()
            .filter_map(|id| store.get(id).and_then(|e| e.order()))
            .collect()
    }

    #[test]
    fn test_insert_child_then_revert() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::with_id("a".into(), "rect")).unwrap();
        txn.insert_child(&root(), &a, 0).unwrap();
        let tx = txn.commit();

        assert_eq!(store.children(&root()), &[a.clone()]);
        assert_eq!(store.entity(&a).unwrap().parent(), Some(&root()));

        tx.revert(&mut store).unwrap();
        assert!(store.children(&root()).is_empty());
        assert!(!store.contains(&a));
    }

    #[test]
    fn test_insert_between_siblings_uses_midpoint() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        for id in ["a", "b", "c"] {
            let id = txn.create(EntityData::with_id(id.into(), "rect")).unwrap();
            txn.append_child(&root(), &id).unwrap();
        }
        let n = txn.create(EntityData::with_id("n".into(), "rect")).unwrap();
        txn.insert_child(&root(), &n, 1).unwrap();
        let _ = txn.commit();

        assert_eq!(store.entity(&n).unwrap().order(), Some(0.5));
        assert_eq!(orders(&store, &root()), vec![0.0, 0.5, 1.0, 2.0]);
        assert_eq!(store.children(&root())[1], n);
    }

    #[test]
    fn test_insert_respaces_degenerate_keys() {
        let mut store = doc();
        // Two siblings that arrived with equal keys
        for id in ["a", "b"] {
            Mutation::Create {
                entity: EntityData::with_id(id.into(), "rect"),
            }
            .apply(&mut store)
            .unwrap();
            Mutation::InsertChild {
                parent: root(),
                child: id.into(),
                position: 0,
                order: 1.0,
            }
            .apply(&mut store)
            .unwrap();
        }

        let mut txn = Txn::new(&mut store);
        let n = txn.create(EntityData::with_id("n".into(), "rect")).unwrap();
        txn.insert_child(&root(), &n, 1).unwrap();
        let tx = txn.commit();

        assert_eq!(orders(&store, &root()), vec![0.0, 0.5, 1.0]);
        assert_eq!(store.children(&root())[1], n);
        store.check_invariants().unwrap();

        tx.revert(&mut store).unwrap();
        assert_eq!(orders(&store, &root()), vec![1.0, 1.0]);
    }

    #[test]
    fn test_insert_out_of_bounds() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::new("rect")).unwrap();
        assert_eq!(
            txn.insert_child(&root(), &a, 3),
            Err(GraphError::IndexOutOfBounds { index: 3, length: 0 })
        );
    }

    #[test]
    fn test_reorder_child_to_end_and_back() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let ids: Vec<EntityId> = ["a", "b", "c"]
            .iter()
            .map(|id| {
                let id = txn.create(EntityData::with_id((*id).into(), "rect")).unwrap();
                txn.append_child(&root(), &id).unwrap();
                id
            })
            .collect();

        txn.reorder_child(&root(), &ids[0], 2).unwrap();
        assert_eq!(txn.store().children(&root()), &[ids[1].clone(), ids[2].clone(), ids[0].clone()]);
        assert_eq!(txn.store().entity(&ids[0]).unwrap().order(), Some(3.0));

        txn.reorder_child(&root(), &ids[0], 1).unwrap();
        assert_eq!(txn.store().children(&root()), &[ids[1].clone(), ids[0].clone(), ids[2].clone()]);
        assert_eq!(txn.store().entity(&ids[0]).unwrap().order(), Some(1.5));
        let _ = txn.commit();
        store.check_invariants().unwrap();
    }

    #[test]
    fn test_move_to_other_parent() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let group = txn.create(EntityData::with_id("g".into(), "group")).unwrap();
        let a = txn.create(EntityData::with_id("a".into(), "rect")).unwrap();
        txn.append_child(&root(), &group).unwrap();
        txn.append_child(&root(), &a).unwrap();
        txn.move_to(&a, &group, 0).unwrap();

        assert!(matches!(
            txn.move_to(&group, &a, 0),
            Err(GraphError::InvariantViolation(_))
        ));
        let tx = txn.commit();

        assert_eq!(store.children(&group), &[a.clone()]);
        assert_eq!(store.children(&root()), &[group.clone()]);

        tx.revert(&mut store).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_subtree_and_revert() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let group = txn.create(EntityData::with_id("g".into(), "group")).unwrap();
        let a = txn
            .create(EntityData::with_id("a".into(), "rect").with_field("w", 3.0))
            .unwrap();
        txn.append_child(&root(), &group).unwrap();
        txn.append_child(&group, &a).unwrap();
        let _ = txn.commit();
        let before = store.observe();

        let mut txn = Txn::new(&mut store);
        txn.delete_subtree(&group).unwrap();
        let tx = txn.commit();
        assert_eq!(store.len(), 1);

        tx.revert(&mut store).unwrap();
        assert_eq!(store.observe(), before);
    }

    #[test]
    fn test_delete_clears_incoming_refs() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::with_id("a".into(), "rect")).unwrap();
        let arrow = txn.create(EntityData::with_id("arrow".into(), "arrow")).unwrap();
        txn.assign_ref(&arrow, "head", Some(&a)).unwrap();
        let _ = txn.commit();

        let mut txn = Txn::new(&mut store);
        txn.delete(&a).unwrap();
        let tx = txn.commit();
        assert_eq!(tx.len(), 2);
        assert_eq!(store.get(&arrow).unwrap().field("head"), None);

        tx.revert(&mut store).unwrap();
        assert_eq!(
            store.get(&arrow).unwrap().field("head"),
            Some(&Value::Ref(a))
        );
    }

    #[test]
    fn test_plain_value_over_reference_reverts() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::with_id("a".into(), "arrow")).unwrap();
        txn.assign_ref(&a, "head", Some(&root())).unwrap();
        let _ = txn.commit();
        let before = store.observe();

        let mut txn = Txn::new(&mut store);
        assert!(txn.assign(&a, "head", Value::Null).unwrap());
        assert!(txn.assign(&a, "head", 4.0).unwrap());
        let tx = txn.commit();
        assert_eq!(store.get(&a).unwrap().field("head"), Some(&Value::Number(4.0)));

        tx.revert(&mut store).unwrap();
        assert_eq!(store.observe(), before);
        assert_eq!(
            store.get(&a).unwrap().field("head"),
            Some(&Value::Ref(root()))
        );
    }

    #[test]
    fn test_reference_over_plain_value_reverts() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn
            .create(EntityData::with_id("a".into(), "rect").with_field("w", 3.0))
            .unwrap();
        let _ = txn.commit();
        let before = store.observe();

        let mut txn = Txn::new(&mut store);
        assert!(txn.assign_ref(&a, "w", Some(&root())).unwrap());
        let tx = txn.commit();
        assert_eq!(tx.len(), 2);
        assert_eq!(store.get(&a).unwrap().field("w"), Some(&Value::Ref(root())));

        tx.revert(&mut store).unwrap();
        assert_eq!(store.get(&a).unwrap().field("w"), Some(&Value::Number(3.0)));
        assert_eq!(store.observe(), before);

        // Clearing a plain value through the reference path also reverts
        let mut txn = Txn::new(&mut store);
        assert!(txn.assign_ref(&a, "w", None).unwrap());
        let tx = txn.commit();
        tx.revert(&mut store).unwrap();
        assert_eq!(store.observe(), before);
    }

    #[test]
    fn test_assign_records_only_changes() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        assert!(txn.assign(&root(), "title", "Page").unwrap());
        assert!(!txn.assign(&root(), "title", "Page").unwrap());
        assert_eq!(txn.mutations().len(), 1);
    }

    #[test]
    fn test_assign_ref_requires_target() {
        let mut store = doc();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::new("arrow")).unwrap();
        assert!(matches!(
            txn.assign_ref(&a, "head", Some(&"ghost".into())),
            Err(GraphError::EntityNotFound(_))
        ));
        assert!(txn.assign_ref(&a, "head", Some(&root())).unwrap());
        assert_eq!(
            txn.store().entity(&a).unwrap().field("head"),
            Some(&Value::Ref(root()))
        );
    }

    #[test]
    fn test_failed_apply_restores_store() {
        let mut store = doc();
        let tx = Transaction::from_mutations(vec![
            Mutation::Create {
                entity: EntityData::with_id("a".into(), "rect"),
            },
            Mutation::Assign {
                id: "missing".into(),
                field: "w".into(),
                old: Value::Null,
                new: Value::Number(1.0),
            },
        ]);

        assert!(tx.apply(&mut store).is_err());
        assert!(!store.contains(&"a".into()));
        assert_eq!(tx.apply_lenient(&mut store), 1);
        assert!(store.contains(&"a".into()));
    }

    #[test]
    fn test_apply_effective_skips_present_effects() {
        let mut store = doc();
        let tx = Transaction::from_mutations(vec![
            Mutation::Create {
                entity: EntityData::with_id("a".into(), "rect"),
            },
            Mutation::Assign {
                id: "a".into(),
                field: "w".into(),
                old: Value::Null,
                new: Value::Number(1.0),
            },
        ]);
        Mutation::Create {
            entity: EntityData::with_id("a".into(), "rect"),
        }
        .apply(&mut store)
        .unwrap();

        let effective = tx.apply_effective(&mut store).unwrap();
        assert_eq!(effective.len(), 1);
        assert!(matches!(effective.mutations()[0], Mutation::Assign { .. }));
    }

    #[test]
    fn test_rollback_live_txn() {
        let mut store = doc();
        let before = store.observe();
        let mut txn = Txn::new(&mut store);
        let a = txn.create(EntityData::new("rect")).unwrap();
        txn.append_child(&root(), &a).unwrap();
        txn.assign(&a, "w", 2.0).unwrap();
        txn.rollback().unwrap();
        assert_eq!(store.observe(), before);
    }
}
