//! Replication Bridge - between the document graph and the replicated map.
//!
//! Outbound, every committed local [`Transaction`] becomes exactly one
//! replicated update, so peers observe it whole or not at all:
//!
//! | Mutation        | Replicated write                               |
//! |-----------------|------------------------------------------------|
//! | CREATE          | insert key with type, fields and constraints   |
//! | DELETE          | remove key                                     |
//! | ASSIGN          | set field (absent clears it)                   |
//! | ASSIGN_REF      | set field to the referenced id                 |
//! | INSERT_CHILD    | set `parent` and `parent:order`                |
//! | REMOVE_CHILD    | clear `parent` and `parent:order`              |
//! | REORDER_CHILD   | set `parent:order`                             |
//!
//! Inbound, a batch of key-level changes is reconciled into the local store
//! in three phases:
//!
//! 1. Materialize every key that is live remotely but unknown locally
//! 2. Reconcile the changed fields of added and updated keys, including
//!    attachment by `parent`/`parent:order`, then replay parked work for the
//!    keys that just materialized
//! 3. Detach and drop removed keys
//!
//! Reconciliation always reads the map's current visible state, so the
//! outcome does not depend on the order batches arrived in. Remote changes go
//! straight to the store and never through the undo history.
//!
//! Concurrent moves can leave the map's `parent` fields describing a cycle
//! (one peer moved x under y while another moved y under x). The member of
//! the cycle whose `parent` was written last (ties broken by id) is kept
//! detached until the cycle is gone, which every peer decides the same way.

use crate::config::SyncConfig;
use crate::doc::{DocUpdate, ReplicatedDoc};
use crate::error::Result;
use crate::pending::PendingRefs;
use std::collections::{BTreeSet, HashSet};
use trellis_core::Stamp;
use tracing::{debug, warn};
use trellis_core::{FieldMap, KeyChange, ReplicatedMap};
use trellis_graph::{
    Applied, Constraint, Entity, EntityData, EntityId, Mutation, Store, Transaction, Value,
    CONSTRAINTS_FIELD, ORDER_FIELD, PARENT_FIELD, TYPE_FIELD,
};

/// Order key for a child whose `parent` arrived without a usable order key.
const MISSING_ORDER: f64 = f64::MAX;

/// Type tag for an entity whose `type` field is missing.
const UNKNOWN_KIND: &str = "unknown";

/// Outcome of reconciling one remote batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteReport {
    /// Key-level change notifications in the batch.
    pub changes: usize,
    /// Local mutations that changed the store.
    pub applied: usize,
    /// Local mutations the store rejected (lenient mode only).
    pub skipped: usize,
    /// Fields and attachments parked for an entity that has not arrived.
    pub parked: usize,
}

impl RemoteReport {
    /// True when the batch left the store untouched.
    pub fn is_quiet(&self) -> bool {
        self.applied == 0 && self.skipped == 0
    }
}

/// Keeps one local store and one replicated document in step.
pub struct Bridge {
    config: SyncConfig,
    doc: ReplicatedDoc,
    pending: PendingRefs,
    /// Entities held detached to break a `parent` cycle.
    cycle_breaks: BTreeSet<EntityId>,
}

impl Bridge {
    pub fn new(config: SyncConfig) -> Self {
        let doc = ReplicatedDoc::new(config.room.clone(), config.replica_id.clone());
        Self {
            config,
            doc,
            pending: PendingRefs::new(),
            cycle_breaks: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn doc(&self) -> &ReplicatedDoc {
        &self.doc
    }

    pub fn room(&self) -> &str {
        self.doc.room()
    }

    pub fn pending(&self) -> &PendingRefs {
        &self.pending
    }

    /// A fresh local store holding only the room's page root.
    pub fn new_store(&self) -> Result<Store> {
        Ok(Store::with_root(self.doc.root_entity())?)
    }

    // === Outbound ===

    /// Encode a committed local transaction as one replicated update.
    ///
    /// `tx` must already be applied to `store`. Work parked for entities the
    /// transaction (re)created is replayed afterwards.
    pub fn commit_local(&mut self, store: &mut Store, tx: &Transaction) -> Result<DocUpdate> {
        let update = self.encode(tx);

        let mut report = RemoteReport::default();
        let mut moved = Vec::new();
        for mutation in tx.mutations() {
            match mutation {
                Mutation::Create { entity } if self.pending.is_waiting_for(&entity.id) => {
                    self.replay_pending(store, &entity.id, &mut moved, &mut report)?;
                }
                // A local move can close a cycle through an entity that is
                // only detached here because it broke an earlier one.
                Mutation::InsertChild { child, .. } if !self.cycle_breaks.is_empty() => {
                    self.reconcile_structure(store, child, &mut report)?;
                }
                _ => {}
            }
        }
        self.settle_structure(store, moved, &mut report)?;
        self.recheck_cycle_breaks(store, &mut report)?;
        Ok(update)
    }

    fn encode(&mut self, tx: &Transaction) -> DocUpdate {
        let mut batch = self.doc.transaction();
        for mutation in tx.mutations() {
            match mutation {
                Mutation::Create { entity } => {
                    batch.insert(entity.id.as_str(), entity_fields(entity));
                }
                Mutation::Delete { entity } => batch.remove(entity.id.as_str()),
                Mutation::Assign { id, field, new, .. } => {
                    let value = (!new.is_null()).then(|| new.clone());
                    batch.set(id.as_str(), field.as_str(), value);
                }
                Mutation::AssignRef { id, field, new, .. } => {
                    batch.set(id.as_str(), field.as_str(), new.clone().map(Value::Ref));
                }
                Mutation::InsertChild {
                    parent,
                    child,
                    order,
                    ..
                } => {
                    batch.set(child.as_str(), PARENT_FIELD, Some(Value::Ref(parent.clone())));
                    batch.set(child.as_str(), ORDER_FIELD, Some(Value::Number(*order)));
                }
                Mutation::RemoveChild { child, .. } => {
                    batch.set(child.as_str(), PARENT_FIELD, None);
                    batch.set(child.as_str(), ORDER_FIELD, None);
                }
                Mutation::ReorderChild {
                    child, new_order, ..
                } => {
                    batch.set(child.as_str(), ORDER_FIELD, Some(Value::Number(*new_order)));
                }
            }
        }
        let update = batch.commit();
        debug!(
            room = %self.doc.room(),
            mutations = tx.len(),
            ops = update.len(),
            "encoded local transaction"
        );
        update
    }

    // === Inbound ===

    /// Apply a peer's update to the replicated document and reconcile the
    /// local store with it.
    pub fn apply_remote(&mut self, store: &mut Store, update: &DocUpdate) -> Result<RemoteReport> {
        let changes = self.doc.apply_update(update);
        debug!(
            room = %self.doc.room(),
            origin = %update.origin,
            ops = update.len(),
            changes = changes.len(),
            "received remote update"
        );
        self.reconcile(store, &changes)
    }

    /// Merge a peer's full state (late join) and reconcile the local store.
    pub fn merge_remote_state(
        &mut self,
        store: &mut Store,
        state: &ReplicatedMap<Value>,
    ) -> Result<RemoteReport> {
        let changes = self.doc.merge(state);
        debug!(room = %self.doc.room(), changes = changes.len(), "merged remote state");
        self.reconcile(store, &changes)
    }

    fn reconcile(&mut self, store: &mut Store, changes: &[KeyChange]) -> Result<RemoteReport> {
        let mut report = RemoteReport {
            changes: changes.len(),
            ..RemoteReport::default()
        };

        // Phase 1: materialize
        let mut materialized = Vec::new();
        for change in changes {
            if matches!(change, KeyChange::Removed { .. }) {
                continue;
            }
            let id = EntityId::from(change.key());
            if store.contains(&id) {
                continue;
            }
            let Some(fields) = self.doc.entity_fields(&id) else {
                continue;
            };
            let entity = decode_entity(&id, &fields);
            self.apply(store, Mutation::Create { entity }, &mut report)?;
            if store.contains(&id) {
                materialized.push(id);
            }
        }
        let fresh: HashSet<&EntityId> = materialized.iter().collect();

        // Phase 2: fields and attachment
        let mut moved = Vec::new();
        for change in changes {
            let id = EntityId::from(change.key());
            match change {
                KeyChange::Removed { .. } => {}
                KeyChange::Updated { fields, .. } if !fresh.contains(&id) => {
                    self.reconcile_fields(
                        store,
                        &id,
                        fields.iter().map(String::as_str),
                        &mut moved,
                        &mut report,
                    )?;
                }
                _ => self.reconcile_entity(store, &id, &mut moved, &mut report)?,
            }
        }
        for id in &materialized {
            self.replay_pending(store, id, &mut moved, &mut report)?;
        }
        self.settle_structure(store, moved, &mut report)?;

        // Phase 3: removal
        for change in changes {
            if let KeyChange::Removed { key } = change {
                self.remove_entity(store, &EntityId::from(key.as_str()), &mut report)?;
            }
        }
        self.recheck_cycle_breaks(store, &mut report)?;

        debug!(
            room = %self.doc.room(),
            applied = report.applied,
            skipped = report.skipped,
            parked = report.parked,
            "reconciled remote batch"
        );
        Ok(report)
    }

    /// Reconcile every field of an entity, present on either side.
    fn reconcile_entity(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        moved: &mut Vec<EntityId>,
        report: &mut RemoteReport,
    ) -> Result<()> {
        let mut names: BTreeSet<String> = self
            .doc
            .entity_fields(id)
            .map(|fields| fields.into_keys().collect())
            .unwrap_or_default();
        if let Some(entity) = store.get(id) {
            names.extend(entity.fields().keys().cloned());
        }
        names.insert(PARENT_FIELD.to_string());
        self.reconcile_fields(store, id, names.iter().map(String::as_str), moved, report)
    }

    fn reconcile_fields<'a>(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        names: impl IntoIterator<Item = &'a str>,
        moved: &mut Vec<EntityId>,
        report: &mut RemoteReport,
    ) -> Result<()> {
        if !store.contains(id) || !self.doc.contains(id) {
            return Ok(());
        }
        let mut structural = false;
        for name in names {
            match name {
                TYPE_FIELD | CONSTRAINTS_FIELD => {}
                PARENT_FIELD | ORDER_FIELD => structural = true,
                field => self.reconcile_field(store, id, field, report)?,
            }
        }
        if structural {
            moved.push(id.clone());
        }
        Ok(())
    }

    /// Bring one ordinary field of `id` in line with the map.
    fn reconcile_field(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        field: &str,
        report: &mut RemoteReport,
    ) -> Result<()> {
        if !self.doc.contains(id) {
            return Ok(());
        }
        let local = match store.get(id) {
            Some(entity) => entity.field(field).cloned().unwrap_or(Value::Null),
            None => return Ok(()),
        };
        let remote = match self.doc.field(id, field).cloned() {
            Some(Value::Ref(target)) if !store.contains(&target) => {
                self.park_ref(&target, id, field, report);
                Value::Null
            }
            Some(value) => value,
            None => Value::Null,
        };
        if remote == local {
            return Ok(());
        }

        // A reference and a plain value never replace each other directly.
        let crosses = matches!(local, Value::Ref(_)) != matches!(remote, Value::Ref(_));
        if crosses && !local.is_null() && !remote.is_null() {
            self.apply(store, write(id, field, local, Value::Null), report)?;
            self.apply(store, write(id, field, Value::Null, remote), report)
        } else {
            self.apply(store, write(id, field, local, remote), report)
        }
    }

    /// Reconcile the structure of every entity in `moved`. Everything leaving
    /// its store parent is detached before anything is attached.
    fn settle_structure(
        &mut self,
        store: &mut Store,
        moved: Vec<EntityId>,
        report: &mut RemoteReport,
    ) -> Result<()> {
        for id in &moved {
            let current = store.get(id).and_then(Entity::parent).cloned();
            if let Some(current) = current {
                if self.map_parent(id).as_ref() != Some(&current) {
                    self.detach(store, &current, id, report)?;
                }
            }
        }
        for id in &moved {
            if self.doc.contains(id) {
                self.reconcile_structure(store, id, report)?;
            }
        }
        Ok(())
    }

    /// Attach, detach, move or reorder `id` to match its `parent` and
    /// `parent:order` fields.
    fn reconcile_structure(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        report: &mut RemoteReport,
    ) -> Result<()> {
        if store.root() == Some(id) {
            return Ok(());
        }
        let Some(entity) = store.get(id) else {
            return Ok(());
        };
        let current_order = entity.order();

        let order = self
            .doc
            .field(id, ORDER_FIELD)
            .and_then(Value::as_number)
            .filter(|order| order.is_finite())
            .unwrap_or(MISSING_ORDER);
        let desired_parent = match self.doc.field(id, PARENT_FIELD).and_then(Value::as_ref_id) {
            Some(parent) if !store.contains(parent) => {
                let parent = parent.clone();
                if self.config.retry_pending_refs {
                    self.pending.park_child(&parent, id);
                    report.parked += 1;
                }
                None
            }
            other => other.cloned(),
        };
        let desired_parent = match desired_parent {
            Some(parent) => match self.cycle_through(id) {
                Some(members) => {
                    let loser = self.cycle_loser(id, members);
                    self.cycle_breaks.insert(loser.clone());
                    if loser == *id {
                        debug!(room = %self.doc.room(), entity = %id, "holding entity detached to break a parent cycle");
                        None
                    } else {
                        let loser_parent = store.get(&loser).and_then(Entity::parent).cloned();
                        if let Some(loser_parent) = loser_parent {
                            self.detach(store, &loser_parent, &loser, report)?;
                        }
                        Some(parent)
                    }
                }
                None => {
                    self.cycle_breaks.remove(id);
                    Some(parent)
                }
            },
            None => {
                self.cycle_breaks.remove(id);
                None
            }
        };
        // The entity may have been the one detached above.
        let current_parent = store.get(id).and_then(Entity::parent).cloned();

        match (current_parent, desired_parent) {
            (None, None) => Ok(()),
            (Some(current), Some(parent)) if current == parent => {
                let Some(old_order) = current_order else {
                    return Ok(());
                };
                if old_order == order {
                    return Ok(());
                }
                let from = position_of(store, &parent, id);
                let to = store.position_for(&parent, order, id)?;
                self.apply(
                    store,
                    Mutation::ReorderChild {
                        parent,
                        child: id.clone(),
                        from,
                        to,
                        old_order,
                        new_order: order,
                    },
                    report,
                )
            }
            (current, desired) => {
                if let Some(current) = current {
                    self.detach(store, &current, id, report)?;
                }
                if let Some(parent) = desired {
                    let position = store.position_for(&parent, order, id)?;
                    self.apply(
                        store,
                        Mutation::InsertChild {
                            parent,
                            child: id.clone(),
                            position,
                            order,
                        },
                        report,
                    )?;
                }
                Ok(())
            }
        }
    }

    /// The members of the `parent` cycle through `id` in the map, if any.
    fn cycle_through(&self, id: &EntityId) -> Option<Vec<EntityId>> {
        let mut members = vec![id.clone()];
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut current = self.map_parent(id)?;
        while current != *id {
            if !seen.insert(current.clone()) {
                // A cycle further up that does not include `id`
                return None;
            }
            members.push(current.clone());
            current = self.map_parent(&current)?;
        }
        Some(members)
    }

    /// The cycle member whose `parent` write is last, then the highest id.
    fn cycle_loser(&self, id: &EntityId, members: Vec<EntityId>) -> EntityId {
        let genesis = Stamp::genesis();
        members
            .into_iter()
            .map(|member| {
                let stamp = self
                    .doc
                    .field_stamp(&member, PARENT_FIELD)
                    .cloned()
                    .unwrap_or_else(|| genesis.clone());
                (stamp, member)
            })
            .max()
            .map(|(_, member)| member)
            .unwrap_or_else(|| id.clone())
    }

    fn map_parent(&self, id: &EntityId) -> Option<EntityId> {
        self.doc
            .field(id, PARENT_FIELD)
            .and_then(Value::as_ref_id)
            .cloned()
    }

    /// Re-decide every entity held detached for a cycle; the cycle may be
    /// gone, or another member may now be the one to detach.
    fn recheck_cycle_breaks(&mut self, store: &mut Store, report: &mut RemoteReport) -> Result<()> {
        let held: Vec<EntityId> = self.cycle_breaks.iter().cloned().collect();
        for id in held {
            if store.contains(&id) && self.doc.contains(&id) {
                self.reconcile_structure(store, &id, report)?;
            } else {
                self.cycle_breaks.remove(&id);
            }
        }
        Ok(())
    }

    /// Drop an entity whose key was removed. Its children stay in the index,
    /// detached and waiting for the key to come back; references to it are
    /// cleared the same way.
    fn remove_entity(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        report: &mut RemoteReport,
    ) -> Result<()> {
        let Some(entity) = store.get(id) else {
            return Ok(());
        };
        if store.root() == Some(id) {
            warn!(room = %self.doc.room(), entity = %id, "ignoring removal of the page root");
            return Ok(());
        }
        let parent = entity.parent().cloned();
        let children = entity.children().to_vec();

        if let Some(parent) = parent {
            self.detach(store, &parent, id, report)?;
        }
        for child in children.iter().rev() {
            self.detach(store, id, child, report)?;
            if self.config.retry_pending_refs {
                self.pending.park_child(id, child);
                report.parked += 1;
            }
        }
        for (holder, field) in store.referrers(id) {
            if holder == *id {
                continue;
            }
            let clear = write(&holder, &field, Value::Ref(id.clone()), Value::Null);
            self.apply(store, clear, report)?;
            self.park_ref(id, &holder, &field, report);
        }

        let entity = store.entity(id)?.data().clone();
        self.apply(store, Mutation::Delete { entity }, report)
    }

    fn detach(
        &self,
        store: &mut Store,
        parent: &EntityId,
        child: &EntityId,
        report: &mut RemoteReport,
    ) -> Result<()> {
        let position = position_of(store, parent, child);
        let order = store
            .get(child)
            .and_then(Entity::order)
            .unwrap_or(MISSING_ORDER);
        self.apply(
            store,
            Mutation::RemoveChild {
                parent: parent.clone(),
                child: child.clone(),
                position,
                order,
            },
            report,
        )
    }

    /// Reconcile everything that was waiting for `id` to arrive.
    fn replay_pending(
        &mut self,
        store: &mut Store,
        id: &EntityId,
        moved: &mut Vec<EntityId>,
        report: &mut RemoteReport,
    ) -> Result<()> {
        let (refs, children) = self.pending.take(id);
        if refs.is_empty() && children.is_empty() {
            return Ok(());
        }
        debug!(
            entity = %id,
            refs = refs.len(),
            children = children.len(),
            "replaying parked work"
        );
        for (holder, field) in refs {
            self.reconcile_field(store, &holder, &field, report)?;
        }
        moved.extend(children);
        Ok(())
    }

    fn park_ref(&mut self, target: &EntityId, holder: &EntityId, field: &str, report: &mut RemoteReport) {
        if self.config.retry_pending_refs {
            self.pending.park_ref(target, holder, field);
            report.parked += 1;
        }
    }

    /// Apply one decoded mutation. In lenient mode a rejected mutation is
    /// logged and skipped.
    fn apply(&self, store: &mut Store, mutation: Mutation, report: &mut RemoteReport) -> Result<()> {
        match mutation.apply(store) {
            Ok(Applied::Changed) => report.applied += 1,
            Ok(Applied::AlreadyApplied) => {}
            Err(err) if self.config.strict_remote => return Err(err.into()),
            Err(err) => {
                warn!(
                    room = %self.doc.room(),
                    entity = %mutation.subject(),
                    error = %err,
                    "skipping remote mutation"
                );
                report.skipped += 1;
            }
        }
        Ok(())
    }
}

/// The replicated projection of an entity's content.
fn entity_fields(entity: &EntityData) -> FieldMap<Value> {
    let mut fields: FieldMap<Value> = entity
        .fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    fields.insert(TYPE_FIELD.to_string(), Value::Text(entity.kind.clone()));
    if !entity.constraints.is_empty() {
        match serde_json::to_value(&entity.constraints) {
            Ok(doc) => {
                fields.insert(CONSTRAINTS_FIELD.to_string(), Value::Doc(doc));
            }
            Err(err) => warn!(entity = %entity.id, error = %err, "constraints not replicated"),
        }
    }
    fields
}

/// A bare entity for a key seen for the first time. Fields and attachment
/// are filled in by reconciliation.
fn decode_entity(id: &EntityId, fields: &FieldMap<Value>) -> EntityData {
    let kind = fields
        .get(TYPE_FIELD)
        .and_then(Value::as_text)
        .unwrap_or(UNKNOWN_KIND);
    let mut entity = EntityData::with_id(id.clone(), kind);
    if let Some(Value::Doc(doc)) = fields.get(CONSTRAINTS_FIELD) {
        match serde_json::from_value::<Vec<Constraint>>(doc.clone()) {
            Ok(constraints) => entity.constraints = constraints,
            Err(err) => warn!(entity = %id, error = %err, "dropping undecodable constraints"),
        }
    }
    entity
}

/// Mutation writing `new` over `old`; reference values use ASSIGN_REF.
fn write(id: &EntityId, field: &str, old: Value, new: Value) -> Mutation {
    if matches!(old, Value::Ref(_)) || matches!(new, Value::Ref(_)) {
        Mutation::AssignRef {
            id: id.clone(),
            field: field.to_string(),
            old: old.as_ref_id().cloned(),
            new: new.as_ref_id().cloned(),
        }
    } else {
        Mutation::Assign {
            id: id.clone(),
            field: field.to_string(),
            old,
            new,
        }
    }
}

fn position_of(store: &Store, parent: &EntityId, child: &EntityId) -> usize {
    store
        .children(parent)
        .iter()
        .position(|c| c == child)
        .unwrap_or_default()
}
