//! Property-based tests for the replicated state types
//!
//! These tests verify the lattice laws that guarantee convergence:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a
//!  - Bottom is identity: a ⊔ ⊥ = a
//!
//! and that delivering the same update batches in any order converges.

use proptest::prelude::*;
use trellis_core::lattice::Lattice;
use trellis_core::lwwreg::LWWRegister;
use trellis_core::map::{FieldMap, ReplicatedMap, Update};
use trellis_core::stamp::Stamp;

const KEYS: [&str; 4] = ["a", "b", "c", "d"];
const FIELDS: [&str; 3] = ["x", "y", "z"];

/// (key, op kind, field, value)
type RawOp = (usize, u8, usize, i64);

fn raw_ops_strategy() -> impl Strategy<Value = Vec<RawOp>> {
    prop::collection::vec((0usize..4, 0u8..4, 0usize..3, 0i64..10), 0..12)
}

/// Run raw ops as one transaction per op and return the produced batches.
fn run_ops(map: &mut ReplicatedMap<i64>, ops: &[RawOp]) -> Vec<Update<i64>> {
    let mut updates = Vec::new();
    for (key, kind, field, value) in ops {
        let key = KEYS[*key];
        let field = FIELDS[*field];
        let mut tx = map.transaction();
        match kind {
            0 => {
                let mut fields = FieldMap::new();
                fields.insert(field.to_string(), *value);
                tx.insert(key, fields);
            }
            1 => tx.remove(key),
            2 => tx.set(key, field, Some(*value)),
            _ => tx.set(key, field, None),
        }
        updates.push(tx.commit());
    }
    updates
}

fn map_strategy(replica: &'static str) -> impl Strategy<Value = ReplicatedMap<i64>> {
    raw_ops_strategy().prop_map(move |ops| {
        let mut map = ReplicatedMap::new(replica);
        let _ = run_ops(&mut map, &ops);
        map
    })
}

fn lwwreg_strategy(replica: &'static str) -> impl Strategy<Value = LWWRegister<i64>> {
    (0i64..100, 1u64..1000).prop_map(move |(value, counter)| {
        let mut reg = LWWRegister::new();
        reg.set(Some(value), Stamp::new(counter, replica));
        reg
    })
}

// ============================================================================
// LWWRegister Property Tests
// ============================================================================

proptest! {
    #[test]
    fn lwwreg_join_is_commutative(
        a in lwwreg_strategy("r1"),
        b in lwwreg_strategy("r2")
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn lwwreg_join_is_associative(
        a in lwwreg_strategy("r1"),
        b in lwwreg_strategy("r2"),
        c in lwwreg_strategy("r3")
    ) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn lwwreg_join_is_idempotent(a in lwwreg_strategy("r1")) {
        prop_assert_eq!(a.join(&a), a);
    }
}

// ============================================================================
// ReplicatedMap Property Tests
// ============================================================================

proptest! {
    #[test]
    fn map_join_is_commutative(
        a in map_strategy("r1"),
        b in map_strategy("r2")
    ) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn map_join_is_associative(
        a in map_strategy("r1"),
        b in map_strategy("r2"),
        c in map_strategy("r3")
    ) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn map_join_is_idempotent(a in map_strategy("r1")) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn map_bottom_is_identity(a in map_strategy("r1")) {
        prop_assert_eq!(a.join(&ReplicatedMap::bottom()), a);
    }

    #[test]
    fn map_updates_converge_in_any_order(
        ops1 in raw_ops_strategy(),
        ops2 in raw_ops_strategy(),
        seed in any::<u64>()
    ) {
        let mut r1 = ReplicatedMap::new("r1");
        let mut r2 = ReplicatedMap::new("r2");
        let mut updates = run_ops(&mut r1, &ops1);
        updates.extend(run_ops(&mut r2, &ops2));

        let mut forward = ReplicatedMap::new("f");
        for update in &updates {
            forward.apply_update(update);
        }

        // Deterministic permutation driven by the seed
        let mut shuffled = updates.clone();
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let mut permuted = ReplicatedMap::new("p");
        for update in &shuffled {
            permuted.apply_update(update);
        }

        prop_assert_eq!(&forward, &permuted);
        prop_assert_eq!(&forward, &r1.join(&r2));
    }

    #[test]
    fn map_duplicate_delivery_is_silent(ops in raw_ops_strategy()) {
        let mut origin = ReplicatedMap::new("r1");
        let updates = run_ops(&mut origin, &ops);

        let mut replica = ReplicatedMap::new("r2");
        for update in &updates {
            replica.apply_update(update);
        }
        for update in &updates {
            prop_assert!(replica.apply_update(update).is_empty());
        }
        prop_assert_eq!(&replica, &origin);
    }
}
