//! Lamport stamps.
//!
//! Every write to the replicated map carries a [`Stamp`]. Stamps are totally
//! ordered by `(counter, replica)`, so two replicas that have seen the same set
//! of writes always agree on which one is "last".

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Lamport timestamp tagged with the replica that issued it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub counter: u64,
    pub replica: String,
}

impl Stamp {
    pub fn new(counter: u64, replica: impl Into<String>) -> Self {
        Self {
            counter,
            replica: replica.into(),
        }
    }

    /// The stamp every replica agrees on before any write happened.
    ///
    /// Writes made at genesis are identical on all replicas and lose to any
    /// real write.
    pub fn genesis() -> Self {
        Self {
            counter: 0,
            replica: String::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.counter == 0 && self.replica.is_empty()
    }
}

impl Default for Stamp {
    fn default() -> Self {
        Self::genesis()
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.replica)
    }
}

/// A per-replica Lamport clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    replica: String,
    counter: u64,
}

impl LamportClock {
    pub fn new(replica: impl Into<String>) -> Self {
        Self {
            replica: replica.into(),
            counter: 0,
        }
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    /// Current counter value (the counter of the last issued or observed stamp).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Issue the next local stamp.
    pub fn tick(&mut self) -> Stamp {
        self.counter += 1;
        Stamp::new(self.counter, self.replica.clone())
    }

    /// Advance past a stamp seen from another replica.
    pub fn observe(&mut self, stamp: &Stamp) {
        self.counter = self.counter.max(stamp.counter);
    }
}
