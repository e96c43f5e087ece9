//! Fractional sequence keys for ordered day lists.
//!
//! # Responsibility
//! - Compute a key between two adjacent neighbors without renumbering.
//! - Detect exhausted key precision and rebalance a whole list atomically.
//!
//! # Invariants
//! - `prev < compute_key(prev, next) < next` whenever `prev < next`.
//! - `rebalance` assigns `1.0..=N.0` in current order and is idempotent.
//! - Neighbor keys must be read from the live list at the insertion index.

use crate::model::itinerary::ItineraryItem;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key assigned to the first item of an empty list.
pub const BASE_KEY: f64 = 1.0;
/// Distance between appended keys and between canonical keys.
pub const KEY_STEP: f64 = 1.0;
/// Smallest adjacent gap tolerated before a rebalance is required.
pub const REBALANCE_EPSILON: f64 = 1e-4;

/// Internal key allocation failure. Never surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceError {
    /// No key with at least `epsilon` clearance fits between the neighbors.
    PrecisionExhausted {
        prev: Option<f64>,
        next: Option<f64>,
        candidate: f64,
    },
}

impl Display for SequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrecisionExhausted {
                prev,
                next,
                candidate,
            } => write!(
                f,
                "sequence precision exhausted: candidate {candidate} between {prev:?} and {next:?}"
            ),
        }
    }
}

impl Error for SequenceError {}

/// Anything carrying a sequence key.
pub trait Sequenced {
    fn sequence(&self) -> f64;
    fn set_sequence(&mut self, value: f64);
}

impl Sequenced for f64 {
    fn sequence(&self) -> f64 {
        *self
    }

    fn set_sequence(&mut self, value: f64) {
        *self = value;
    }
}

impl Sequenced for ItineraryItem {
    fn sequence(&self) -> f64 {
        self.sequence
    }

    fn set_sequence(&mut self, value: f64) {
        self.sequence = value;
    }
}

/// Computes a key for a slot between `prev` and `next`.
///
/// `None` means "no neighbor on that side". Callers must pass the immediate
/// neighbors of the slot; non-adjacent neighbors silently break ordering.
pub fn compute_key(prev: Option<f64>, next: Option<f64>) -> f64 {
    match (prev, next) {
        (None, None) => BASE_KEY,
        (None, Some(next)) => next / 2.0,
        (Some(prev), None) => prev + KEY_STEP,
        (Some(prev), Some(next)) => (prev + next) / 2.0,
    }
}

/// Returns the neighbors of slot `index` in `keys`, clamping the slot to
/// `0..=keys.len()`.
pub fn neighbors_at(keys: &[f64], index: usize) -> (Option<f64>, Option<f64>) {
    let index = index.min(keys.len());
    let prev = index.checked_sub(1).map(|at| keys[at]);
    let next = keys.get(index).copied();
    (prev, next)
}

/// Computes the key for slot `index` in an ordered key list.
pub fn key_for_index(keys: &[f64], index: usize) -> f64 {
    let (prev, next) = neighbors_at(keys, index);
    compute_key(prev, next)
}

/// Computes the key for slot `index`, refusing keys that would sit closer
/// than `epsilon` to a neighbor.
///
/// # Errors
/// - `SequenceError::PrecisionExhausted` when the slot needs a rebalance.
pub fn try_key_for_index(keys: &[f64], index: usize, epsilon: f64) -> Result<f64, SequenceError> {
    let (prev, next) = neighbors_at(keys, index);
    let candidate = compute_key(prev, next);

    let clears_prev = prev.map_or(true, |prev| candidate - prev >= epsilon);
    let clears_next = next.map_or(true, |next| next - candidate >= epsilon);
    if candidate.is_finite() && clears_prev && clears_next {
        return Ok(candidate);
    }

    Err(SequenceError::PrecisionExhausted {
        prev,
        next,
        candidate,
    })
}

/// Returns the smallest adjacent gap, or `None` for fewer than two keys.
pub fn min_gap(keys: &[f64]) -> Option<f64> {
    keys.windows(2)
        .map(|pair| pair[1] - pair[0])
        .reduce(f64::min)
}

/// Returns whether any adjacent gap is below [`REBALANCE_EPSILON`].
pub fn needs_rebalance(keys: &[f64]) -> bool {
    needs_rebalance_with(keys, REBALANCE_EPSILON)
}

/// Returns whether any adjacent gap is below `epsilon`.
pub fn needs_rebalance_with(keys: &[f64], epsilon: f64) -> bool {
    min_gap(keys).is_some_and(|gap| gap < epsilon)
}

/// Reassigns canonical keys `1.0, 2.0, …` preserving current order.
///
/// Must receive the entire list of one day; renumbering a sub-slice would
/// interleave canonical keys with stale ones.
pub fn rebalance<T: Sequenced>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_sequence(canonical_key(index));
    }
}

/// Canonical key for position `index`.
pub fn canonical_key(index: usize) -> f64 {
    BASE_KEY + KEY_STEP * index as f64
}
