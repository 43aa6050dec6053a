//! End-to-end editing scenarios through the public API.

use std::sync::{Arc, Mutex};
use trellis_graph::{
    Constraint, ConstraintRegistry, Editor, EditorConfigBuilder, Entity, EntityData, EntityId,
    IdMode, LifecycleHooks, Snapshot, Store, Txn, Value,
};

fn root() -> EntityId {
    "root".into()
}

fn page() -> Store {
    Store::with_root(EntityData::with_id(root(), "page")).unwrap()
}

fn order_keys(store: &Store, parent: &EntityId) -> Vec<f64> {
    store
        .children(parent)
        .iter()
        .filter_map(|c| store.get(c).and_then(Entity::order))
        .collect()
}

// ============================================================================
// Undo / redo
// ============================================================================

#[test]
fn test_attach_then_undo_keeps_entity_indexed() {
    let mut editor = Editor::with_store(page());
    let a = editor
        .transact(|txn| txn.create(EntityData::with_id("a".into(), "rect")))
        .unwrap();
    editor.transact(|txn| txn.insert_child(&root(), &a, 0)).unwrap();

    assert_eq!(editor.store().children(&root()), &[a.clone()]);

    editor.undo().unwrap();
    assert!(editor.store().children(&root()).is_empty());
    assert!(editor.store().get(&a).unwrap().parent().is_none());
    assert!(editor.store().contains(&a));

    editor.redo().unwrap();
    assert_eq!(editor.store().children(&root()), &[a]);
    editor.store().check_invariants().unwrap();
}

#[test]
fn test_insert_between_first_two_of_three() {
    let mut editor = Editor::with_store(page());
    editor
        .transact(|txn| {
            for id in ["a", "b", "c"] {
                let id = txn.create(EntityData::with_id(id.into(), "rect"))?;
                txn.append_child(&root(), &id)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(order_keys(editor.store(), &root()), vec![0.0, 1.0, 2.0]);

    let n = editor
        .transact(|txn| {
            let n = txn.create(EntityData::new("rect"))?;
            txn.insert_child(&root(), &n, 1)?;
            Ok(n)
        })
        .unwrap();

    assert_eq!(editor.store().get(&n).unwrap().order(), Some(0.5));
    assert_eq!(order_keys(editor.store(), &root()), vec![0.0, 0.5, 1.0, 2.0]);
}

#[test]
fn test_cancel_two_transaction_action() {
    let mut editor = Editor::with_store(page());
    editor
        .transact(|txn| {
            let id = txn.create(EntityData::with_id("keep".into(), "rect"))?;
            txn.append_child(&root(), &id)
        })
        .unwrap();
    let before = editor.store().observe();
    let undo_len = editor.history().undo_len();
    let _ = editor.take_outgoing();

    editor.begin_action("draw").unwrap();
    editor
        .transact(|txn| {
            let id = txn.create(EntityData::with_id("draft".into(), "rect"))?;
            txn.insert_child(&root(), &id, 0)
        })
        .unwrap();
    editor
        .transact(|txn| {
            txn.assign(&"draft".into(), "w", 0.0)?;
            txn.reorder_child(&root(), &"draft".into(), 1)
        })
        .unwrap();
    editor.cancel_action().unwrap();

    assert_eq!(editor.store().observe(), before);
    assert_eq!(editor.history().undo_len(), undo_len);
    assert!(editor.take_outgoing().is_empty());
}

#[test]
fn test_bounded_history() {
    let config = EditorConfigBuilder::new().max_undo_depth(2).build();
    let mut editor = Editor::new(page(), ConstraintRegistry::new(), (), config);
    for i in 0..5 {
        editor
            .transact(|txn| txn.assign(&root(), "n", i as f64))
            .unwrap();
    }
    assert!(editor.undo().unwrap());
    assert!(editor.undo().unwrap());
    assert!(!editor.undo().unwrap());
    assert_eq!(
        editor.store().get(&root()).unwrap().field("n"),
        Some(&Value::Number(2.0))
    );
}

// ============================================================================
// Constraints
// ============================================================================

#[test]
fn test_resolution_is_quiet_at_fixpoint() {
    let mut registry = ConstraintRegistry::new();
    registry.register_fn(
        "fit-content",
        |txn: &mut Txn<'_>, _: &EntityId, entity: &EntityId, _: &(), _: &Constraint| {
            let store = txn.store();
            let total: f64 = store
                .children(entity)
                .iter()
                .filter_map(|c| store.get(c).and_then(|e| e.field("h")).and_then(Value::as_number))
                .sum();
            Ok(txn.assign(entity, "h", total)?)
        },
    );
    let mut editor = Editor::new(
        page(),
        registry,
        (),
        EditorConfigBuilder::new().build(),
    );

    let frame = editor
        .transact(|txn| {
            let frame = txn.create(
                EntityData::new("frame").with_constraint(Constraint::new("fit-content")),
            )?;
            txn.append_child(&root(), &frame)?;
            for h in [10.0, 20.0] {
                let item = txn.create(EntityData::new("text").with_field("h", h))?;
                txn.append_child(&frame, &item)?;
            }
            Ok(frame)
        })
        .unwrap();
    assert_eq!(
        editor.store().get(&frame).unwrap().field("h"),
        Some(&Value::Number(30.0))
    );

    // A no-op edit produces no transaction and no undo entry
    let undo_len = editor.history().undo_len();
    editor.transact(|_| Ok(())).unwrap();
    assert_eq!(editor.history().undo_len(), undo_len);
}

// ============================================================================
// Hooks
// ============================================================================

#[derive(Clone, Default)]
struct Counter {
    attached: Arc<Mutex<Vec<EntityId>>>,
    detached: Arc<Mutex<Vec<EntityId>>>,
}

impl LifecycleHooks for Counter {
    fn on_attach(&mut self, entity: &Entity) {
        self.attached.lock().unwrap().push(entity.id().clone());
    }

    fn on_detach(&mut self, entity: &Entity) {
        self.detached.lock().unwrap().push(entity.id().clone());
    }
}

#[test]
fn test_hooks_fire_once_across_undo_redo() {
    let counter = Counter::default();
    let store = page().with_hooks(counter.clone());
    let mut editor = Editor::with_store(store);

    let a = editor
        .transact(|txn| {
            let a = txn.create(EntityData::new("rect"))?;
            txn.append_child(&root(), &a)?;
            Ok(a)
        })
        .unwrap();
    editor.undo().unwrap();
    editor.redo().unwrap();

    assert_eq!(*counter.attached.lock().unwrap(), vec![a.clone(), a.clone()]);
    assert_eq!(*counter.detached.lock().unwrap(), vec![a]);
}

// ============================================================================
// Copy / paste
// ============================================================================

#[test]
fn test_paste_creates_fresh_subtree() {
    let mut editor = Editor::with_store(page());
    let group = editor
        .transact(|txn| {
            let group = txn.create(EntityData::new("group"))?;
            let child = txn.create(EntityData::new("rect").with_field("w", 7.0))?;
            txn.append_child(&root(), &group)?;
            txn.append_child(&group, &child)?;
            Ok(group)
        })
        .unwrap();

    let clipboard = Snapshot::serialize(editor.store(), &[group.clone()])
        .unwrap()
        .to_json()
        .unwrap();

    editor.begin_action("paste").unwrap();
    let pasted = editor
        .transact(|txn| {
            let snapshot = Snapshot::from_json(&clipboard)?;
            let roots = snapshot.deserialize(txn, IdMode::Fresh, |id| Some(id.clone()))?;
            for id in &roots {
                txn.append_child(&root(), id)?;
            }
            Ok(roots)
        })
        .unwrap();
    editor.end_action().unwrap();

    assert_eq!(pasted.len(), 1);
    assert_ne!(pasted[0], group);
    assert_eq!(editor.store().children(&root()).len(), 2);
    assert_eq!(editor.store().len(), 5);

    editor.undo().unwrap();
    assert_eq!(editor.store().len(), 3);
    editor.store().check_invariants().unwrap();
}
