//! Itinerary domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by the ordering engine.
//! - Keep one closed, validated shape for trips, days, items and pool entries.
//!
//! # Invariants
//! - Every entity is identified by a stable `Uuid`.
//! - Day lists are ordered by item `sequence`, never by insertion order.

pub mod itinerary;
pub mod place;
