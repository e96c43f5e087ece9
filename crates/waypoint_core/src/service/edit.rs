//! Pending edit command objects.
//!
//! # Responsibility
//! - Carry one optimistic edit from `begin_*` through `dispatch` to `settle`.
//! - Keep everything rollback needs: the before-snapshot and the prior value
//!   of the single item the edit touched.
//!
//! # Invariants
//! - `version` is unique and increasing per coordinator.
//! - `before` is the state immediately before the optimistic mutation.

use crate::model::itinerary::{DayId, DayPatch, ItemId, ItemPatch, ItineraryDay, ItineraryItem};
use crate::repo::itinerary_repo::{CreateItemRequest, ReorderRequest};
use crate::service::itinerary_state::ItineraryState;
use std::time::Instant;

/// Local edit ordinal.
pub type EditVersion = u64;

/// Store call an edit is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum EditRequest {
    /// Create an item; `provisional_id` stands in until the store answers.
    CreateItem {
        provisional_id: ItemId,
        request: CreateItemRequest,
    },
    ReorderItem {
        item_id: ItemId,
        request: ReorderRequest,
    },
    UpdateItem {
        item_id: ItemId,
        patch: ItemPatch,
    },
    DeleteItem {
        item_id: ItemId,
    },
    UpdateDay {
        day_id: DayId,
        patch: DayPatch,
    },
    ClearDay {
        day_id: DayId,
    },
    DeleteDay {
        day_id: DayId,
    },
}

impl EditRequest {
    /// Short operation name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::CreateItem { .. } => "create_item",
            Self::ReorderItem { .. } => "reorder_item",
            Self::UpdateItem { .. } => "update_item",
            Self::DeleteItem { .. } => "delete_item",
            Self::UpdateDay { .. } => "update_day",
            Self::ClearDay { .. } => "clear_day",
            Self::DeleteDay { .. } => "delete_day",
        }
    }

    /// Item whose local state this edit owns, for item-level edits.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::CreateItem { provisional_id, .. } => Some(*provisional_id),
            Self::ReorderItem { item_id, .. }
            | Self::UpdateItem { item_id, .. }
            | Self::DeleteItem { item_id } => Some(*item_id),
            Self::UpdateDay { .. } | Self::ClearDay { .. } | Self::DeleteDay { .. } => None,
        }
    }

    /// Day this edit targets, for day-level edits.
    pub fn day_id(&self) -> Option<DayId> {
        match self {
            Self::UpdateDay { day_id, .. }
            | Self::ClearDay { day_id }
            | Self::DeleteDay { day_id } => Some(*day_id),
            _ => None,
        }
    }
}

/// Successful store answer for one edit.
#[derive(Debug, Clone, PartialEq)]
pub enum EditResponse {
    Item(ItineraryItem),
    Day(ItineraryDay),
    /// Deletions answer with nothing.
    Done,
}

/// Result of settling one edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Store answer was folded into local state.
    Confirmed,
    /// A later edit or refresh superseded this answer.
    Ignored,
    /// A provisional item received its store id.
    Created {
        provisional_id: ItemId,
        item_id: ItemId,
    },
}

/// An item as it was before an edit, with the ids it sat between.
///
/// Keys may be reassigned by a later rebalance, so a revert locates the
/// slot through the neighbors.
#[derive(Debug, Clone)]
pub(crate) struct PriorPlacement {
    pub(crate) item: ItineraryItem,
    /// Item directly above; `None` when it was first.
    pub(crate) prev: Option<ItemId>,
    /// Item directly below; `None` when it was last.
    pub(crate) next: Option<ItemId>,
}

/// One optimistic edit awaiting its store round trip.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub(crate) version: EditVersion,
    pub(crate) request: EditRequest,
    pub(crate) before: ItineraryState,
    /// Touched item and its neighbors before the edit; `None` for creates.
    pub(crate) prior: Option<PriorPlacement>,
    /// Coordinator mutation count right after this edit applied.
    pub(crate) mutation_mark: u64,
    pub(crate) started_at: Instant,
}

impl PendingEdit {
    pub fn version(&self) -> EditVersion {
        self.version
    }

    pub fn request(&self) -> &EditRequest {
        &self.request
    }

    /// Snapshot taken immediately before the optimistic mutation.
    pub fn before(&self) -> &ItineraryState {
        &self.before
    }
}
