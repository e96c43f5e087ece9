//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from ordering and coordination logic.
//!
//! # Invariants
//! - Repository writes validate item fields before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

use uuid::Uuid;

pub mod catalog_repo;
pub mod itinerary_repo;

/// Parses one persisted uuid, naming the column on failure.
pub(crate) fn parse_uuid(value: &str, column: &'static str) -> Result<Uuid, String> {
    Uuid::parse_str(value).map_err(|err| format!("invalid uuid `{value}` in {column}: {err}"))
}
