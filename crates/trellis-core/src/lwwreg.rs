//! Last-Write-Wins (LWW) Register CRDT
//!
//! The LWW Register always retains the write with the highest [`Stamp`].
//! Stamps are totally ordered by `(counter, replica)`, so concurrent writes
//! resolve identically on every replica.
//!
//! A register can also hold "no value": clearing is itself a stamped write,
//! which is what lets a removal win over an older assignment.

use crate::lattice::Lattice;
use crate::stamp::Stamp;
use serde::{Deserialize, Serialize};

/// A Last-Write-Wins Register CRDT
///
/// Stores an optional value along with the stamp of the write that produced it.
/// A stamp identifies exactly one write, so two registers carrying the same
/// stamp carry the same value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    /// The current value (`None` once cleared)
    value: Option<T>,
    /// The stamp of the last winning write
    stamp: Stamp,
}

impl<T: Clone> LWWRegister<T> {
    /// Create a new LWW Register with no value
    pub fn new() -> Self {
        Self {
            value: None,
            stamp: Stamp::genesis(),
        }
    }

    /// Create a register that already holds a write.
    pub fn with_value(value: Option<T>, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Write a value (or clear with `None`) at the given stamp.
    ///
    /// Returns `true` when the write won, i.e. its stamp is strictly newer
    /// than the current one. Replaying a write is a no-op.
    pub fn set(&mut self, value: Option<T>, stamp: Stamp) -> bool {
        if stamp > self.stamp {
            self.value = value;
            self.stamp = stamp;
            true
        } else {
            false
        }
    }

    /// Get the current value if it exists
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Get the stamp of the current value
    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    /// Check if the register is empty (never written, or cleared)
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl<T: Clone> Default for LWWRegister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq> Lattice for LWWRegister<T> {
    fn bottom() -> Self {
        Self::new()
    }

    /// Join operation: keep the write with the highest stamp.
    /// At equal stamps a written register beats a never-written one, which
    /// only matters for genesis writes.
    fn join(&self, other: &Self) -> Self {
        let other_wins = match other.stamp.cmp(&self.stamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.value.is_none() && other.value.is_some(),
        };

        if other_wins {
            other.clone()
        } else {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lwwreg_basic_operations() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();

        assert!(reg.is_empty());
        assert_eq!(reg.get(), None);

        assert!(reg.set(Some(42), Stamp::new(100, "replica1")));
        assert_eq!(reg.get(), Some(&42));
        assert_eq!(reg.stamp().counter, 100);
    }

    #[test]
    fn test_lwwreg_higher_stamp_wins() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();

        reg.set(Some(10), Stamp::new(100, "replica1"));
        reg.set(Some(20), Stamp::new(200, "replica2"));
        assert_eq!(reg.get(), Some(&20));

        // Old stamp doesn't overwrite
        assert!(!reg.set(Some(30), Stamp::new(150, "replica1")));
        assert_eq!(reg.get(), Some(&20));
    }

    #[test]
    fn test_lwwreg_tie_break_replica_id() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();

        reg.set(Some(10), Stamp::new(100, "replica1"));
        reg.set(Some(20), Stamp::new(100, "replica2"));
        assert_eq!(reg.get(), Some(&20));

        reg.set(Some(30), Stamp::new(100, "replica1"));
        assert_eq!(reg.get(), Some(&20));
    }

    #[test]
    fn test_lwwreg_clear_is_a_write() {
        let mut reg: LWWRegister<&str> = LWWRegister::new();
        reg.set(Some("x"), Stamp::new(1, "a"));
        reg.set(None, Stamp::new(2, "b"));
        assert!(reg.is_empty());

        // A stale assignment cannot resurrect the value
        reg.set(Some("y"), Stamp::new(1, "z"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_lwwreg_replay_is_noop() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();
        assert!(reg.set(Some(1), Stamp::new(5, "a")));
        assert!(!reg.set(Some(1), Stamp::new(5, "a")));
    }

    #[test]
    fn test_lwwreg_join_commutative() {
        let mut reg1: LWWRegister<i32> = LWWRegister::new();
        reg1.set(Some(10), Stamp::new(100, "replica1"));

        let mut reg2: LWWRegister<i32> = LWWRegister::new();
        reg2.set(Some(20), Stamp::new(150, "replica2"));

        assert_eq!(reg1.join(&reg2), reg2.join(&reg1));
        assert_eq!(reg1.join(&reg2).get(), Some(&20));
    }

    #[test]
    fn test_lwwreg_bottom_is_identity() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();
        reg.set(Some(42), Stamp::new(100, "replica1"));

        let joined = reg.join(&LWWRegister::bottom());
        assert_eq!(joined, reg);
    }

    #[test]
    fn test_lwwreg_serialization() {
        let mut reg: LWWRegister<i32> = LWWRegister::new();
        reg.set(Some(42), Stamp::new(100, "replica1"));

        let serialized = serde_json::to_string(&reg).unwrap();
        let deserialized: LWWRegister<i32> = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, reg);
    }
}
