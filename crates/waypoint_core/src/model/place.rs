//! Place and pool-entry domain model.
//!
//! # Responsibility
//! - Define the catalog record (`Place`) referenced by itinerary items.
//! - Define the saved-place pool entry with its derived placement link.
//!
//! # Invariants
//! - `Place` is immutable once created; core references it only by id.
//! - `PoolEntry::placed == true` iff `current_item_id` names a live item.
//! - The pool back-reference is maintenance-only and never owns the item.

use crate::model::itinerary::ItemId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable catalog place identifier.
pub type PlaceId = Uuid;

/// Closed set of place categories shown in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceCategory {
    Restaurant,
    Attraction,
    Hotel,
    Cafe,
    Shopping,
}

impl PlaceCategory {
    /// Stable storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Attraction => "attraction",
            Self::Hotel => "hotel",
            Self::Cafe => "cafe",
            Self::Shopping => "shopping",
        }
    }

    /// Parses one storage string. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "restaurant" => Some(Self::Restaurant),
            "attraction" => Some(Self::Attraction),
            "hotel" => Some(Self::Hotel),
            "cafe" => Some(Self::Cafe),
            "shopping" => Some(Self::Shopping),
            _ => None,
        }
    }
}

/// Immutable point of interest owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Stable catalog id.
    pub place_id: PlaceId,
    /// Display name.
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: Option<PlaceCategory>,
    /// Rating on a 0-5 scale when known.
    pub rating: Option<f64>,
}

impl Place {
    /// Creates a place with a generated id and no optional metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            place_id: Uuid::new_v4(),
            name: name.into(),
            address: None,
            latitude: None,
            longitude: None,
            category: None,
            rating: None,
        }
    }
}

/// One saved place in a trip pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Catalog place this entry wraps.
    pub place_id: PlaceId,
    /// Whether the place currently sits in some day.
    pub placed: bool,
    /// Weak back-reference to the item that placed this entry.
    pub current_item_id: Option<ItemId>,
    /// User notes on the saved place.
    pub notes: Option<String>,
}

impl PoolEntry {
    /// Creates an unplaced entry for one place.
    pub fn unplaced(place_id: PlaceId) -> Self {
        Self {
            place_id,
            placed: false,
            current_item_id: None,
            notes: None,
        }
    }

    /// Points this entry at a live item.
    pub fn link(&mut self, item_id: ItemId) {
        self.placed = true;
        self.current_item_id = Some(item_id);
    }

    /// Reverts this entry to unplaced and clears the back-reference.
    pub fn unlink(&mut self) {
        self.placed = false;
        self.current_item_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{PlaceCategory, PoolEntry};
    use uuid::Uuid;

    #[test]
    fn category_storage_strings_are_stable() {
        for category in [
            PlaceCategory::Restaurant,
            PlaceCategory::Attraction,
            PlaceCategory::Hotel,
            PlaceCategory::Cafe,
            PlaceCategory::Shopping,
        ] {
            assert_eq!(PlaceCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(PlaceCategory::parse("museum"), None);
    }

    #[test]
    fn link_and_unlink_keep_flag_and_reference_in_step() {
        let mut entry = PoolEntry::unplaced(Uuid::new_v4());
        let item_id = Uuid::new_v4();

        entry.link(item_id);
        assert!(entry.placed);
        assert_eq!(entry.current_item_id, Some(item_id));

        entry.unlink();
        assert!(!entry.placed);
        assert_eq!(entry.current_item_id, None);
    }
}
