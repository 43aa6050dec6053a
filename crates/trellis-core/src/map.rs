//! Replicated Map - keys mapped to flat, last-writer-wins field maps
//!
//! This is the conflict-free structure the document graph is projected onto.
//! Each key (an entity id) carries:
//! - a liveness register (insert/remove of the whole key)
//! - one LWW register per field
//!
//! Local edits are grouped with [`ReplicatedMap::transaction`]; committing the
//! transaction yields one [`Update`] that peers apply atomically with
//! [`ReplicatedMap::apply_update`]. Applying an update (or merging a full state)
//! reports key-level [`KeyChange`] notifications computed from visible state
//! before and after the batch, so duplicate and stale deliveries are silent.

use crate::lattice::Lattice;
use crate::lwwreg::LWWRegister;
use crate::stamp::{LamportClock, Stamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The visible fields of one key.
pub type FieldMap<V> = BTreeMap<String, V>;

/// Per-key replicated state.
///
/// `reset` is the stamp of the newest insert seen for the key. Field writes
/// older than it are hidden, which is how an insert clears fields it does
/// not list without touching their registers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct KeyState<V> {
    live: LWWRegister<bool>,
    reset: Stamp,
    fields: BTreeMap<String, LWWRegister<V>>,
}

impl<V: Clone + PartialEq> KeyState<V> {
    fn new() -> Self {
        Self {
            live: LWWRegister::new(),
            reset: Stamp::genesis(),
            fields: BTreeMap::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.live.get() == Some(&true)
    }

    fn field(&self, name: &str) -> Option<&V> {
        self.fields
            .get(name)
            .filter(|reg| *reg.stamp() >= self.reset)
            .and_then(LWWRegister::get)
    }

    fn field_stamp(&self, name: &str) -> Option<&Stamp> {
        self.fields
            .get(name)
            .filter(|reg| *reg.stamp() >= self.reset && reg.get().is_some())
            .map(LWWRegister::stamp)
    }

    fn visible(&self) -> FieldMap<V> {
        self.fields
            .iter()
            .filter(|(_, reg)| *reg.stamp() >= self.reset)
            .filter_map(|(name, reg)| reg.get().map(|v| (name.clone(), v.clone())))
            .collect()
    }

    fn join_assign(&mut self, other: &KeyState<V>) {
        self.live = self.live.join(&other.live);
        if other.reset > self.reset {
            self.reset = other.reset.clone();
        }
        for (name, reg) in &other.fields {
            let joined = match self.fields.get(name) {
                Some(mine) => mine.join(reg),
                None => reg.clone(),
            };
            self.fields.insert(name.clone(), joined);
        }
    }
}

/// A single replicated write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapOp<V> {
    /// Make a key live with exactly these fields; fields not listed are cleared.
    Insert {
        key: String,
        fields: FieldMap<V>,
        stamp: Stamp,
    },
    /// Remove a key.
    Remove { key: String, stamp: Stamp },
    /// Write (or clear, with `None`) one field of a key.
    Set {
        key: String,
        field: String,
        value: Option<V>,
        stamp: Stamp,
    },
}

impl<V> MapOp<V> {
    pub fn key(&self) -> &str {
        match self {
            MapOp::Insert { key, .. } | MapOp::Remove { key, .. } | MapOp::Set { key, .. } => key,
        }
    }

    pub fn stamp(&self) -> &Stamp {
        match self {
            MapOp::Insert { stamp, .. } | MapOp::Remove { stamp, .. } | MapOp::Set { stamp, .. } => {
                stamp
            }
        }
    }
}

/// One committed replication transaction: peers apply it whole or not at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Update<V> {
    /// Replica that produced the batch.
    pub origin: String,
    /// Writes in submission order.
    pub ops: Vec<MapOp<V>>,
}

impl<V> Update<V> {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// A key-level change notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyChange {
    /// The key became visible.
    Added { key: String },
    /// The key stopped being visible.
    Removed { key: String },
    /// The key stayed visible and these fields changed value.
    Updated { key: String, fields: Vec<String> },
}

impl KeyChange {
    pub fn key(&self) -> &str {
        match self {
            KeyChange::Added { key } | KeyChange::Removed { key } | KeyChange::Updated { key, .. } => {
                key
            }
        }
    }
}

/// A conflict-free map from keys to LWW field maps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicatedMap<V> {
    clock: LamportClock,
    entries: BTreeMap<String, KeyState<V>>,
}

impl<V: Clone + PartialEq> ReplicatedMap<V> {
    /// Create an empty map owned by `replica_id`.
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            clock: LamportClock::new(replica_id),
            entries: BTreeMap::new(),
        }
    }

    pub fn replica_id(&self) -> &str {
        self.clock.replica()
    }

    /// Visible fields of a live key.
    pub fn get(&self, key: &str) -> Option<FieldMap<V>> {
        self.entries
            .get(key)
            .filter(|state| state.is_live())
            .map(KeyState::visible)
    }

    /// One visible field of a live key.
    pub fn field(&self, key: &str, field: &str) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|state| state.is_live())
            .and_then(|state| state.field(field))
    }

    /// Stamp of the write behind a visible field.
    pub fn field_stamp(&self, key: &str, field: &str) -> Option<&Stamp> {
        self.entries
            .get(key)
            .filter(|state| state.is_live())
            .and_then(|state| state.field_stamp(field))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).map(KeyState::is_live).unwrap_or(false)
    }

    /// All live keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_live())
            .map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a local transaction. Writes apply immediately; the batch is handed
    /// out for replication by [`MapTransaction::commit`].
    pub fn transaction(&mut self) -> MapTransaction<'_, V> {
        MapTransaction {
            map: self,
            ops: Vec::new(),
        }
    }

    /// Make a key live at the genesis stamp without producing an update.
    ///
    /// Every replica performs the same genesis write for shared keys (such as
    /// the document root), so it never needs to travel.
    pub fn genesis(&mut self, key: impl Into<String>, fields: FieldMap<V>) {
        let state = self.entries.entry(key.into()).or_insert_with(KeyState::new);
        if state.live.is_empty() && state.live.stamp().is_genesis() {
            state.live = LWWRegister::with_value(Some(true), Stamp::genesis());
        }
        for (name, value) in fields {
            let reg = state.fields.entry(name).or_default();
            if reg.is_empty() && reg.stamp().is_genesis() {
                *reg = LWWRegister::with_value(Some(value), Stamp::genesis());
            }
        }
    }

    /// Apply a batch produced by another replica.
    pub fn apply_update(&mut self, update: &Update<V>) -> Vec<KeyChange> {
        let keys = touched_keys(update.ops.iter().map(MapOp::key));
        self.observe_changes(keys, |map| {
            for op in &update.ops {
                map.clock.observe(op.stamp());
                map.apply_op(op);
            }
        })
    }

    /// Merge another replica's full state (late join / anti-entropy).
    pub fn merge(&mut self, other: &ReplicatedMap<V>) -> Vec<KeyChange> {
        let keys = touched_keys(other.entries.keys().map(String::as_str));
        self.observe_changes(keys, |map| {
            map.clock
                .observe(&Stamp::new(other.clock.counter(), other.replica_id()));
            for (key, state) in &other.entries {
                map.entries
                    .entry(key.clone())
                    .or_insert_with(KeyState::new)
                    .join_assign(state);
            }
        })
    }

    fn apply_op(&mut self, op: &MapOp<V>) {
        match op {
            MapOp::Insert { key, fields, stamp } => {
                let state = self.entries.entry(key.clone()).or_insert_with(KeyState::new);
                state.live.set(Some(true), stamp.clone());
                if *stamp > state.reset {
                    state.reset = stamp.clone();
                }
                for (name, value) in fields {
                    state
                        .fields
                        .entry(name.clone())
                        .or_default()
                        .set(Some(value.clone()), stamp.clone());
                }
            }
            MapOp::Remove { key, stamp } => {
                let state = self.entries.entry(key.clone()).or_insert_with(KeyState::new);
                state.live.set(Some(false), stamp.clone());
            }
            MapOp::Set {
                key,
                field,
                value,
                stamp,
            } => {
                let state = self.entries.entry(key.clone()).or_insert_with(KeyState::new);
                state
                    .fields
                    .entry(field.clone())
                    .or_default()
                    .set(value.clone(), stamp.clone());
            }
        }
    }

    /// Run `mutate` and diff the visible state of `keys` around it.
    fn observe_changes<F>(&mut self, keys: Vec<String>, mutate: F) -> Vec<KeyChange>
    where
        F: FnOnce(&mut Self),
    {
        let before: Vec<Option<FieldMap<V>>> = keys.iter().map(|k| self.get(k)).collect();
        mutate(self);

        let mut changes = Vec::new();
        for (key, before) in keys.into_iter().zip(before) {
            match (before, self.get(&key)) {
                (None, Some(_)) => changes.push(KeyChange::Added { key }),
                (Some(_), None) => changes.push(KeyChange::Removed { key }),
                (Some(old), Some(new)) => {
                    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
                    let fields: Vec<String> = names
                        .into_iter()
                        .filter(|name| old.get(*name) != new.get(*name))
                        .cloned()
                        .collect();
                    if !fields.is_empty() {
                        changes.push(KeyChange::Updated { key, fields });
                    }
                }
                (None, None) => {}
            }
        }
        changes
    }
}

/// Unique keys in first-touch order.
fn touched_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    keys.filter(|k| seen.insert(*k)).map(str::to_string).collect()
}

impl<V: PartialEq> PartialEq for ReplicatedMap<V> {
    /// Replicas are equal when their replicated entries are; the local clock
    /// is bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V: Clone + PartialEq> Lattice for ReplicatedMap<V> {
    fn bottom() -> Self {
        Self::new("")
    }

    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        joined.merge(other);
        joined
    }
}

/// A local batch of writes against a [`ReplicatedMap`].
#[must_use = "an uncommitted transaction is never replicated"]
pub struct MapTransaction<'a, V> {
    map: &'a mut ReplicatedMap<V>,
    ops: Vec<MapOp<V>>,
}

impl<V: Clone + PartialEq> MapTransaction<'_, V> {
    /// Make `key` live with exactly `fields`.
    pub fn insert(&mut self, key: impl Into<String>, fields: FieldMap<V>) {
        let stamp = self.map.clock.tick();
        self.push(MapOp::Insert {
            key: key.into(),
            fields,
            stamp,
        });
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        let stamp = self.map.clock.tick();
        self.push(MapOp::Remove {
            key: key.into(),
            stamp,
        });
    }

    /// Write one field; `None` clears it.
    pub fn set(&mut self, key: impl Into<String>, field: impl Into<String>, value: Option<V>) {
        let stamp = self.map.clock.tick();
        self.push(MapOp::Set {
            key: key.into(),
            field: field.into(),
            value,
            stamp,
        });
    }

    /// Read through the transaction (sees its own writes).
    pub fn get(&self, key: &str) -> Option<FieldMap<V>> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Close the transaction, returning the batch for peers.
    pub fn commit(self) -> Update<V> {
        Update {
            origin: self.map.replica_id().to_string(),
            ops: self.ops,
        }
    }

    fn push(&mut self, op: MapOp<V>) {
        self.map.apply_op(&op);
        self.ops.push(op);
    }
}
