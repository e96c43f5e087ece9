//! Local itinerary snapshot mutated by the reorder coordinator.
//!
//! # Responsibility
//! - Hold one trip's days and pool as a validated, cloneable value.
//! - Provide the splice, key allocation and pool-link primitives that
//!   coordinator edits are built from.
//!
//! # Invariants
//! - Days are ordered by `day_number`; item ids are unique across days.
//! - Every day satisfies `ItineraryDay::validate` after each primitive.
//! - Pool links follow one rule: keep a live link, else the first live item
//!   of the place in day/sequence order, else unplaced.

use crate::model::itinerary::{
    DayId, DayPatch, ItemId, ItineraryDay, ItineraryItem, ModelValidationError, TripId,
};
use crate::model::place::{PlaceId, PoolEntry};
use crate::ordering::sequence::{key_for_index, needs_rebalance_with, rebalance, try_key_for_index};
use chrono::Days;
use log::debug;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Request rejected before any local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnknownDay(DayId),
    UnknownItem(ItemId),
    /// Place is not saved in the trip pool.
    PlaceNotInPool(PlaceId),
    /// Pool entry already sits in a day.
    PlaceAlreadyPlaced(PlaceId),
    /// Patch changes nothing.
    EmptyPatch,
    /// Resulting item or day shape is invalid.
    Model(ModelValidationError),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDay(id) => write!(f, "unknown itinerary day: {id}"),
            Self::UnknownItem(id) => write!(f, "unknown itinerary item: {id}"),
            Self::PlaceNotInPool(id) => write!(f, "place {id} is not saved in this trip"),
            Self::PlaceAlreadyPlaced(id) => write!(f, "place {id} is already placed"),
            Self::EmptyPatch => write!(f, "patch must change at least one field"),
            Self::Model(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelValidationError> for ValidationError {
    fn from(value: ModelValidationError) -> Self {
        Self::Model(value)
    }
}

/// One trip's days and saved-place pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryState {
    trip_id: TripId,
    days: Vec<ItineraryDay>,
    pool: Vec<PoolEntry>,
}

impl ItineraryState {
    /// Builds a validated snapshot and normalizes pool links.
    ///
    /// # Errors
    /// - Duplicate day or item ids, foreign days, misowned items, unordered
    ///   keys and out-of-range durations.
    pub fn new(
        trip_id: TripId,
        mut days: Vec<ItineraryDay>,
        pool: Vec<PoolEntry>,
    ) -> Result<Self, ModelValidationError> {
        let mut day_ids = HashSet::new();
        let mut item_ids = HashSet::new();
        for day in &days {
            if day.trip_id != trip_id {
                return Err(ModelValidationError::TripMismatch {
                    day_id: day.day_id,
                    trip_id,
                });
            }
            if !day_ids.insert(day.day_id) {
                return Err(ModelValidationError::DuplicateDay(day.day_id));
            }
            day.validate()?;
            for item in &day.items {
                if !item_ids.insert(item.item_id) {
                    return Err(ModelValidationError::DuplicateItem(item.item_id));
                }
            }
        }
        days.sort_by_key(|day| day.day_number);

        let mut state = Self {
            trip_id,
            days,
            pool,
        };
        state.recompute_pool_links();
        Ok(state)
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    /// Days in `day_number` order.
    pub fn days(&self) -> &[ItineraryDay] {
        &self.days
    }

    pub fn day(&self, day_id: DayId) -> Option<&ItineraryDay> {
        self.days.iter().find(|day| day.day_id == day_id)
    }

    pub fn item(&self, item_id: ItemId) -> Option<&ItineraryItem> {
        self.locate(item_id)
            .map(|(day_index, item_index)| &self.days[day_index].items[item_index])
    }

    pub fn pool(&self) -> &[PoolEntry] {
        &self.pool
    }

    pub fn pool_entry(&self, place_id: PlaceId) -> Option<&PoolEntry> {
        self.pool.iter().find(|entry| entry.place_id == place_id)
    }

    /// Returns `(day_index, item_index)` of one item.
    pub(crate) fn locate(&self, item_id: ItemId) -> Option<(usize, usize)> {
        self.days.iter().enumerate().find_map(|(day_index, day)| {
            day.position_of(item_id)
                .map(|item_index| (day_index, item_index))
        })
    }

    pub(crate) fn day_mut(&mut self, day_id: DayId) -> Option<&mut ItineraryDay> {
        self.days.iter_mut().find(|day| day.day_id == day_id)
    }

    pub(crate) fn item_mut(&mut self, item_id: ItemId) -> Option<&mut ItineraryItem> {
        let (day_index, item_index) = self.locate(item_id)?;
        Some(&mut self.days[day_index].items[item_index])
    }

    /// Computes a key for `slot` in one day, rebalancing the day first when
    /// the slot has no precision left.
    pub(crate) fn key_for_slot(
        &mut self,
        day_id: DayId,
        slot: usize,
        epsilon: f64,
    ) -> Result<f64, ValidationError> {
        let day = self
            .day_mut(day_id)
            .ok_or(ValidationError::UnknownDay(day_id))?;
        match try_key_for_index(&day.sequences(), slot, epsilon) {
            Ok(key) => Ok(key),
            Err(err) => {
                debug!(
                    "event=sequence_rebalance module=service status=ok day_id={} items={} reason={}",
                    day_id,
                    day.items.len(),
                    err
                );
                rebalance(&mut day.items);
                Ok(key_for_index(&day.sequences(), slot))
            }
        }
    }

    /// Splices `item` into its owning day by key.
    pub(crate) fn insert_item(&mut self, item: ItineraryItem) -> Result<usize, ValidationError> {
        let day = self
            .day_mut(item.day_id)
            .ok_or(ValidationError::UnknownDay(item.day_id))?;
        Ok(day.insert_sorted(item))
    }

    /// Removes one item from whichever day holds it.
    pub(crate) fn take_item(&mut self, item_id: ItemId) -> Option<ItineraryItem> {
        let (day_index, item_index) = self.locate(item_id)?;
        Some(self.days[day_index].items.remove(item_index))
    }

    /// Ids directly above and below one item in its day.
    pub(crate) fn neighbors(&self, item_id: ItemId) -> Option<(Option<ItemId>, Option<ItemId>)> {
        let (day_index, item_index) = self.locate(item_id)?;
        let items = &self.days[day_index].items;
        let prev = item_index
            .checked_sub(1)
            .map(|index| items[index].item_id);
        let next = items.get(item_index + 1).map(|item| item.item_id);
        Some((prev, next))
    }

    /// Reinserts `item` into its day right below `prev`, or right above
    /// `next` when `prev` is gone, with a key fresh for the current list.
    ///
    /// Returns `false` without inserting when both neighbors are gone.
    pub(crate) fn restore_between(
        &mut self,
        mut item: ItineraryItem,
        prev: Option<ItemId>,
        next: Option<ItemId>,
        epsilon: f64,
    ) -> Result<bool, ValidationError> {
        let day = self
            .day(item.day_id)
            .ok_or(ValidationError::UnknownDay(item.day_id))?;
        let slot = match (prev, next) {
            (None, _) => Some(0),
            (Some(prev), next) => match (day.position_of(prev), next) {
                (Some(index), _) => Some(index + 1),
                (None, None) => Some(day.items.len()),
                (None, Some(next)) => day.position_of(next),
            },
        };
        let Some(slot) = slot else {
            return Ok(false);
        };

        item.sequence = self.key_for_slot(item.day_id, slot, epsilon)?;
        self.insert_item(item)?;
        Ok(true)
    }

    /// Rebalances one day when some adjacent gap fell below `epsilon`.
    pub(crate) fn rebalance_if_needed(&mut self, day_id: DayId, epsilon: f64) -> bool {
        let Some(day) = self.day_mut(day_id) else {
            return false;
        };
        if !needs_rebalance_with(&day.sequences(), epsilon) {
            return false;
        }
        rebalance(&mut day.items);
        true
    }

    /// Removes every item of one day and returns them.
    pub(crate) fn clear_day(&mut self, day_id: DayId) -> Result<Vec<ItineraryItem>, ValidationError> {
        let day = self
            .day_mut(day_id)
            .ok_or(ValidationError::UnknownDay(day_id))?;
        Ok(std::mem::take(&mut day.items))
    }

    /// Removes one day and shifts later days one number and one date back.
    pub(crate) fn remove_day(&mut self, day_id: DayId) -> Result<ItineraryDay, ValidationError> {
        let index = self
            .days
            .iter()
            .position(|day| day.day_id == day_id)
            .ok_or(ValidationError::UnknownDay(day_id))?;
        let removed = self.days.remove(index);
        for day in &mut self.days[index..] {
            day.day_number = day.day_number.saturating_sub(1).max(1);
            day.date = day.date.and_then(|date| date.checked_sub_days(Days::new(1)));
        }
        Ok(removed)
    }

    /// Appends one store-created day.
    pub(crate) fn push_day(&mut self, day: ItineraryDay) -> Result<(), ValidationError> {
        if day.trip_id != self.trip_id {
            return Err(ModelValidationError::TripMismatch {
                day_id: day.day_id,
                trip_id: self.trip_id,
            }
            .into());
        }
        if self.day(day.day_id).is_some() {
            return Err(ModelValidationError::DuplicateDay(day.day_id).into());
        }
        day.validate()?;
        let index = self
            .days
            .partition_point(|existing| existing.day_number <= day.day_number);
        self.days.insert(index, day);
        Ok(())
    }

    pub(crate) fn apply_day_patch(
        &mut self,
        day_id: DayId,
        patch: &DayPatch,
    ) -> Result<(), ValidationError> {
        let day = self
            .day_mut(day_id)
            .ok_or(ValidationError::UnknownDay(day_id))?;
        patch.apply_to(day);
        Ok(())
    }

    pub(crate) fn pool_entry_mut(&mut self, place_id: PlaceId) -> Option<&mut PoolEntry> {
        self.pool.iter_mut().find(|entry| entry.place_id == place_id)
    }

    /// Swaps one item's id, carrying pool links along.
    pub(crate) fn rename_item(&mut self, from: ItemId, to: ItemId) -> bool {
        let Some(item) = self.item_mut(from) else {
            return false;
        };
        item.item_id = to;
        for entry in &mut self.pool {
            if entry.current_item_id == Some(from) {
                entry.link(to);
            }
        }
        true
    }

    /// Re-derives every pool entry's placement link from live items.
    pub(crate) fn recompute_pool_links(&mut self) {
        let live: Vec<(ItemId, PlaceId)> = self
            .days
            .iter()
            .flat_map(|day| day.items.iter())
            .map(|item| (item.item_id, item.place_id))
            .collect();

        for entry in &mut self.pool {
            let still_live = entry.current_item_id.is_some_and(|current| {
                live.iter()
                    .any(|(item_id, place_id)| *item_id == current && *place_id == entry.place_id)
            });
            if still_live {
                entry.placed = true;
                continue;
            }
            match live
                .iter()
                .find(|(_, place_id)| *place_id == entry.place_id)
            {
                Some((item_id, _)) => entry.link(*item_id),
                None => entry.unlink(),
            }
        }
    }
}
