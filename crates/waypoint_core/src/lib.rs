//! Core ordering engine for Waypoint itineraries.
//! This crate is the single source of truth for day ordering invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoordinatorConfig, CoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::itinerary::{
    DayId, DayPatch, ItemId, ItemPatch, ItineraryDay, ItineraryItem, ModelValidationError,
    TransportMode, Trip, TripId,
};
pub use model::place::{Place, PlaceCategory, PlaceId, PoolEntry};
pub use ordering::drag::{
    resolve_insert_index, DragSession, DragSource, DragTarget, DropIntent, DropPosition,
    ItemBounds,
};
pub use ordering::sequence::{compute_key, needs_rebalance, rebalance, REBALANCE_EPSILON};
pub use repo::catalog_repo::{CatalogRepoError, CatalogRepository, SqliteCatalogRepository};
pub use repo::itinerary_repo::{
    CreateItemRequest, ItineraryRepoError, ItineraryRepoResult, ItineraryRepository,
    RepoErrorKind, ReorderRequest, SqliteItineraryRepository,
};
pub use service::edit::{EditRequest, EditResponse, PendingEdit, Settlement};
pub use service::itinerary_state::{ItineraryState, ValidationError};
pub use service::reorder_coordinator::{CoordinatorError, ReorderCoordinator};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
