//! Fractional order keys.
//!
//! Siblings are linearized by a real-number key so that the replicated
//! representation, which has no ordered list per key, can still express
//! child order. A new key is the midpoint between its neighbors, or one past
//! the neighbor at either end. Siblings with equal keys (possible after
//! concurrent inserts from different peers) are ordered by id.

use crate::id::EntityId;
use std::cmp::Ordering;

/// Order key field of the replicated projection.
pub const ORDER_FIELD: &str = "parent:order";

/// Key for a sibling inserted between `left` and `right`.
///
/// Returns `None` when no representable key lies strictly between the
/// neighbors (they are equal, out of order, or too close together). The
/// caller re-spaces the siblings and asks again.
pub fn key_between(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    let key = match (left, right) {
        (None, None) => 0.0,
        (Some(l), None) => l + 1.0,
        (None, Some(r)) => r - 1.0,
        (Some(l), Some(r)) => l + (r - l) / 2.0,
    };
    let above = left.map_or(true, |l| key > l);
    let below = right.map_or(true, |r| key < r);
    (key.is_finite() && above && below).then_some(key)
}

/// Evenly spaced keys for `count` siblings.
pub fn respaced(count: usize) -> impl Iterator<Item = f64> {
    (0..count).map(|i| i as f64)
}

/// Total order over siblings: by key, then by id.
pub fn cmp_sibling(a: (f64, &EntityId), b: (f64, &EntityId)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1))
}
