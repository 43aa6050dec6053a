// File: `crates/trellis-core/src/lib.rs`
//! # trellis-core
//!
//! Convergence primitives shared by the Trellis crates:
//! - [`lattice::Lattice`] - the join-semilattice every replicated state implements
//! - [`stamp::Stamp`] / [`stamp::LamportClock`] - total order over writes from all replicas
//! - [`lwwreg::LWWRegister`] - last-writer-wins cell
//! - [`map::ReplicatedMap`] - the conflict-free map of keys to flat field maps,
//!   with atomic update batches and key-level change notifications

pub mod lattice;
pub mod lwwreg;
pub mod map;
pub mod stamp;

pub use lattice::Lattice;
pub use lwwreg::LWWRegister;
pub use map::{FieldMap, KeyChange, MapOp, MapTransaction, ReplicatedMap, Update};
pub use stamp::{LamportClock, Stamp};
