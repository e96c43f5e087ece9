//! Ordering engine primitives.
//!
//! # Responsibility
//! - `sequence`: fractional keys, precision checks and atomic rebalance.
//! - `drag`: pointer geometry to drop slot, owned by a per-gesture session.
//!
//! # Invariants
//! - Both modules are pure: they never touch stores or shared state.

pub mod drag;
pub mod sequence;
