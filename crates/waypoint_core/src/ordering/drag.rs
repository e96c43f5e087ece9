//! Drag geometry to insertion slot resolution.
//!
//! # Responsibility
//! - Turn a pointer Y coordinate plus item boxes into a drop slot.
//! - Own all per-gesture state in an explicit `DragSession`.
//!
//! # Invariants
//! - Slots are recomputed from the geometry delivered with each event.
//! - A session never mutates itinerary state; cancelling it is dropping it.
//! - Ties between equally distant boundaries resolve to the lower slot.

use crate::model::itinerary::{DayId, ItemId};
use crate::model::place::PlaceId;
use log::debug;

/// Vertical extent of one rendered item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemBounds {
    pub item_id: ItemId,
    pub top: f64,
    pub height: f64,
}

impl ItemBounds {
    pub fn midpoint(&self) -> f64 {
        self.top + self.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Resolved target of a drag: one day and one slot in `0..=len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropPosition {
    pub day_id: DayId,
    pub index: usize,
}

/// Container under the pointer, with geometry read at event time.
#[derive(Debug, Clone, Copy)]
pub enum DragTarget<'a> {
    /// A day list with its item boxes in display order.
    Day {
        day_id: DayId,
        items: &'a [ItemBounds],
    },
    /// The saved-place pool.
    Pool,
    /// No recognized drop target.
    Outside,
}

/// What is being dragged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    PoolEntry(PlaceId),
    Item(ItemId),
}

/// Edit requested by a completed gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropIntent {
    /// Place a pool entry into a day.
    Add {
        place_id: PlaceId,
        day_id: DayId,
        index: usize,
    },
    /// Move an existing item to a slot, possibly in another day.
    Move {
        item_id: ItemId,
        day_id: DayId,
        index: usize,
    },
    /// Return an item to the pool.
    Unplace { item_id: ItemId },
}

#[derive(Debug, Clone, Copy)]
struct Boundary {
    y: f64,
    index: usize,
}

/// Maps `pointer_y` to an insertion slot among `items`.
///
/// Boundaries sit at each item's midpoint (slot `i`) and at the last item's
/// bottom edge (slot `len`). The nearest boundary wins; a pointer above it
/// takes the boundary's slot, otherwise the next one, capped at `len`.
pub fn resolve_insert_index(pointer_y: f64, items: &[ItemBounds]) -> usize {
    let Some(last) = items.last() else {
        return 0;
    };

    let boundaries = items
        .iter()
        .enumerate()
        .map(|(index, bounds)| Boundary {
            y: bounds.midpoint(),
            index,
        })
        .chain(std::iter::once(Boundary {
            y: last.bottom(),
            index: items.len(),
        }));

    let mut nearest: Option<(Boundary, f64)> = None;
    for boundary in boundaries {
        let distance = (pointer_y - boundary.y).abs();
        match nearest {
            Some((_, best)) if distance >= best => {}
            _ => nearest = Some((boundary, distance)),
        }
    }

    let Some((boundary, _)) = nearest else {
        return 0;
    };
    let slot = if pointer_y < boundary.y {
        boundary.index
    } else {
        boundary.index + 1
    };
    slot.min(items.len())
}

/// Resolves a drop position for day targets; other targets have none.
pub fn resolve_drop_position(pointer_y: f64, target: &DragTarget<'_>) -> Option<DropPosition> {
    match target {
        DragTarget::Day { day_id, items } => Some(DropPosition {
            day_id: *day_id,
            index: resolve_insert_index(pointer_y, items),
        }),
        DragTarget::Pool | DragTarget::Outside => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hover {
    Nothing,
    Day(DropPosition),
    Pool,
}

/// State of one in-progress drag gesture.
///
/// Replaces ambient "pointer Y" and "pending insertion" globals: the session
/// is created on drag start, fed every pointer event, and consumed on drop or
/// cancel.
#[derive(Debug, Clone)]
pub struct DragSession {
    source: DragSource,
    pointer_y: Option<f64>,
    hover: Hover,
}

impl DragSession {
    pub fn start(source: DragSource) -> Self {
        Self {
            source,
            pointer_y: None,
            hover: Hover::Nothing,
        }
    }

    pub fn source(&self) -> DragSource {
        self.source
    }

    /// Last pointer coordinate seen by the session.
    pub fn pointer_y(&self) -> Option<f64> {
        self.pointer_y
    }

    /// Current day slot candidate, for drop indicators.
    pub fn candidate(&self) -> Option<DropPosition> {
        match self.hover {
            Hover::Day(position) => Some(position),
            Hover::Nothing | Hover::Pool => None,
        }
    }

    /// Records a pointer move and re-resolves the candidate slot.
    pub fn pointer_moved(
        &mut self,
        pointer_y: f64,
        target: &DragTarget<'_>,
    ) -> Option<DropPosition> {
        self.pointer_y = Some(pointer_y);
        self.hover = match target {
            DragTarget::Day { .. } => match resolve_drop_position(pointer_y, target) {
                Some(position) => Hover::Day(position),
                None => Hover::Nothing,
            },
            DragTarget::Pool => Hover::Pool,
            DragTarget::Outside => Hover::Nothing,
        };
        self.candidate()
    }

    /// Ends the gesture over `target` and returns the requested edit.
    ///
    /// The slot is resolved from the final geometry, not from the last
    /// candidate. Drops outside any target, or a pool entry dropped back on
    /// the pool, yield `None`.
    pub fn finish(mut self, pointer_y: f64, target: &DragTarget<'_>) -> Option<DropIntent> {
        self.pointer_moved(pointer_y, target);
        let intent = match (self.source, self.hover) {
            (DragSource::PoolEntry(place_id), Hover::Day(position)) => Some(DropIntent::Add {
                place_id,
                day_id: position.day_id,
                index: position.index,
            }),
            (DragSource::Item(item_id), Hover::Day(position)) => Some(DropIntent::Move {
                item_id,
                day_id: position.day_id,
                index: position.index,
            }),
            (DragSource::Item(item_id), Hover::Pool) => Some(DropIntent::Unplace { item_id }),
            (DragSource::PoolEntry(_), Hover::Pool) | (_, Hover::Nothing) => None,
        };
        debug!(
            "event=drag_finish module=ordering status=ok resolved={}",
            intent.is_some()
        );
        intent
    }

    /// Abandons the gesture. Nothing was mutated, so nothing is undone.
    pub fn cancel(self) {
        debug!("event=drag_cancel module=ordering status=ok");
    }
}

#[cfg(test)]
mod tests {
    use super::{
        resolve_drop_position, resolve_insert_index, DragSession, DragSource, DragTarget,
        DropIntent, DropPosition, ItemBounds,
    };
    use uuid::Uuid;

    fn boxes(tops: &[f64], height: f64) -> Vec<ItemBounds> {
        tops.iter()
            .map(|top| ItemBounds {
                item_id: Uuid::new_v4(),
                top: *top,
                height,
            })
            .collect()
    }

    #[test]
    fn two_items_resolve_before_between_and_after() {
        // Midpoints at 125 and 175.
        let items = boxes(&[100.0, 150.0], 50.0);
        assert_eq!(resolve_insert_index(100.0, &items), 0);
        assert_eq!(resolve_insert_index(150.0, &items), 1);
        assert_eq!(resolve_insert_index(300.0, &items), 2);
    }

    #[test]
    fn empty_day_always_resolves_to_zero() {
        assert_eq!(resolve_insert_index(-50.0, &[]), 0);
        assert_eq!(resolve_insert_index(1e9, &[]), 0);
    }

    #[test]
    fn pointer_far_above_resolves_to_first_slot() {
        let items = boxes(&[100.0, 150.0, 200.0], 50.0);
        assert_eq!(resolve_insert_index(-1000.0, &items), 0);
    }

    #[test]
    fn pointer_below_midpoint_of_middle_item_resolves_after_it() {
        let items = boxes(&[100.0, 150.0, 200.0], 50.0);
        assert_eq!(resolve_insert_index(180.0, &items), 2);
        assert_eq!(resolve_insert_index(170.0, &items), 1);
    }

    #[test]
    fn pointer_between_last_midpoint_and_bottom_resolves_to_end() {
        let items = boxes(&[0.0], 100.0);
        assert_eq!(resolve_insert_index(90.0, &items), 1);
        assert_eq!(resolve_insert_index(10.0, &items), 0);
    }

    #[test]
    fn pool_and_outside_have_no_position() {
        assert_eq!(resolve_drop_position(10.0, &DragTarget::Pool), None);
        assert_eq!(resolve_drop_position(10.0, &DragTarget::Outside), None);
    }

    #[test]
    fn session_tracks_latest_geometry_on_every_move() {
        let day_id = Uuid::new_v4();
        let place_id = Uuid::new_v4();
        let mut session = DragSession::start(DragSource::PoolEntry(place_id));

        let before_scroll = boxes(&[100.0, 150.0], 50.0);
        let candidate = session.pointer_moved(
            130.0,
            &DragTarget::Day {
                day_id,
                items: &before_scroll,
            },
        );
        assert_eq!(candidate, Some(DropPosition { day_id, index: 1 }));

        // Same pointer, list scrolled down by 100px.
        let after_scroll = boxes(&[200.0, 250.0], 50.0);
        let candidate = session.pointer_moved(
            130.0,
            &DragTarget::Day {
                day_id,
                items: &after_scroll,
            },
        );
        assert_eq!(candidate, Some(DropPosition { day_id, index: 0 }));
        assert_eq!(session.pointer_y(), Some(130.0));
    }

    #[test]
    fn pool_entry_drop_on_day_requests_add() {
        let day_id = Uuid::new_v4();
        let place_id = Uuid::new_v4();
        let items = boxes(&[0.0], 40.0);
        let session = DragSession::start(DragSource::PoolEntry(place_id));
        let intent = session.finish(
            5.0,
            &DragTarget::Day {
                day_id,
                items: &items,
            },
        );
        assert_eq!(
            intent,
            Some(DropIntent::Add {
                place_id,
                day_id,
                index: 0
            })
        );
    }

    #[test]
    fn item_drop_on_pool_requests_unplace_and_outside_is_noop() {
        let item_id = Uuid::new_v4();
        let session = DragSession::start(DragSource::Item(item_id));
        assert_eq!(
            session.finish(0.0, &DragTarget::Pool),
            Some(DropIntent::Unplace { item_id })
        );

        let mut session = DragSession::start(DragSource::Item(item_id));
        let items = boxes(&[0.0], 40.0);
        session.pointer_moved(
            5.0,
            &DragTarget::Day {
                day_id: Uuid::new_v4(),
                items: &items,
            },
        );
        assert_eq!(session.finish(5.0, &DragTarget::Outside), None);
    }

    #[test]
    fn pool_entry_dropped_back_on_pool_is_noop() {
        let session = DragSession::start(DragSource::PoolEntry(Uuid::new_v4()));
        assert_eq!(session.finish(0.0, &DragTarget::Pool), None);
    }
}
