//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate optimistic itinerary edits over repository calls.
//! - Keep UI layers decoupled from storage details.

pub mod edit;
pub mod itinerary_state;
pub mod reorder_coordinator;
