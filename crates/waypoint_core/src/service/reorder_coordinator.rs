//! Optimistic itinerary edit orchestration.
//!
//! # Responsibility
//! - Apply add/move/remove/copy and field edits to local state first, then
//!   confirm them against the authoritative store.
//! - Roll failed edits back and request a refresh after conflicts.
//! - Keep pool placement links derived from live items.
//!
//! # Invariants
//! - The coordinator is the only writer of its `ItineraryState`.
//! - A store answer older than the latest edit of its item is never applied,
//!   except for its revision stamp when that is newer than the local one.
//! - Reorder tokens are read at dispatch, so settled edits of this
//!   coordinator never count as foreign changes.
//! - Items with a provisional id accept no further edits until created.
//! - Every failed edit leaves local state as if the edit had not happened,
//!   except for later edits that already superseded it.

use crate::config::CoordinatorConfig;
use crate::model::itinerary::{
    DayId, DayPatch, ItemId, ItemPatch, ItineraryDay, ItineraryItem, TripId,
};
use crate::model::place::{PlaceId, PoolEntry};
use crate::ordering::drag::DropIntent;
use crate::repo::itinerary_repo::{
    CreateItemRequest, ItineraryRepoError, ItineraryRepoResult, ItineraryRepository,
    RepoErrorKind, ReorderRequest,
};
use crate::service::edit::{
    EditRequest, EditResponse, EditVersion, PendingEdit, PriorPlacement, Settlement,
};
use crate::service::itinerary_state::{ItineraryState, ValidationError};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors surfaced by coordinator operations.
#[derive(Debug)]
pub enum CoordinatorError {
    /// Request rejected before any mutation.
    Validation(ValidationError),
    /// Item still waits for its create confirmation.
    ItemPending(ItemId),
    /// Store state moved on; local state was rolled back and refreshed.
    Conflict(ItineraryRepoError),
    /// Store unreachable or failed; local state was rolled back.
    Network(ItineraryRepoError),
    /// Store refused the request; local state was rolled back.
    Rejected(ItineraryRepoError),
}

impl CoordinatorError {
    /// Stable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ItemPending(_) => "item_pending",
            Self::Conflict(_) => "conflict",
            Self::Network(_) => "network",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::ItemPending(id) => write!(f, "item {id} is still being created"),
            Self::Conflict(err) => write!(f, "edit conflicted with newer data: {err}"),
            Self::Network(err) => write!(f, "{err}"),
            Self::Rejected(err) => write!(f, "edit rejected: {err}"),
        }
    }
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::ItemPending(_) => None,
            Self::Conflict(err) | Self::Network(err) | Self::Rejected(err) => Some(err),
        }
    }
}

impl From<ValidationError> for CoordinatorError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ItineraryRepoError> for CoordinatorError {
    fn from(value: ItineraryRepoError) -> Self {
        match value.kind() {
            RepoErrorKind::Conflict => Self::Conflict(value),
            RepoErrorKind::Network => Self::Network(value),
            RepoErrorKind::Validation | RepoErrorKind::NotFound => Self::Rejected(value),
        }
    }
}

/// Owner of one trip's local itinerary and its edits.
pub struct ReorderCoordinator<R: ItineraryRepository> {
    repo: R,
    config: CoordinatorConfig,
    state: ItineraryState,
    last_version: EditVersion,
    /// Edits up to this version were superseded by a refresh.
    refreshed_through: EditVersion,
    item_versions: HashMap<ItemId, EditVersion>,
    day_versions: HashMap<DayId, EditVersion>,
    provisional: HashSet<ItemId>,
    mutations: u64,
}

impl<R: ItineraryRepository> ReorderCoordinator<R> {
    /// Loads one trip from the store.
    pub fn load(
        repo: R,
        trip_id: TripId,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        let started_at = Instant::now();
        let state = fetch_state(&repo, trip_id)?;
        info!(
            "event=coordinator_load module=service status=ok trip_id={} days={} pool={} duration_ms={}",
            trip_id,
            state.days().len(),
            state.pool().len(),
            started_at.elapsed().as_millis()
        );
        Ok(Self {
            repo,
            config,
            state,
            last_version: 0,
            refreshed_through: 0,
            item_versions: HashMap::new(),
            day_versions: HashMap::new(),
            provisional: HashSet::new(),
            mutations: 0,
        })
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub fn trip_id(&self) -> TripId {
        self.state.trip_id()
    }

    /// Latest local snapshot.
    pub fn state(&self) -> &ItineraryState {
        &self.state
    }

    pub fn days(&self) -> &[ItineraryDay] {
        self.state.days()
    }

    pub fn day(&self, day_id: DayId) -> Option<&ItineraryDay> {
        self.state.day(day_id)
    }

    pub fn item(&self, item_id: ItemId) -> Option<&ItineraryItem> {
        self.state.item(item_id)
    }

    pub fn pool(&self) -> &[PoolEntry] {
        self.state.pool()
    }

    pub fn pool_entry(&self, place_id: PlaceId) -> Option<&PoolEntry> {
        self.state.pool_entry(place_id)
    }

    /// Returns whether an item still carries a provisional id.
    pub fn is_pending(&self, item_id: ItemId) -> bool {
        self.provisional.contains(&item_id)
    }

    /// Places an unplaced pool entry into a day at a slot.
    ///
    /// Returns the store-assigned item id.
    pub fn add_item(
        &mut self,
        place_id: PlaceId,
        day_id: DayId,
        index: usize,
    ) -> Result<ItemId, CoordinatorError> {
        let (edit, provisional_id) = self.start_add_item(place_id, day_id, index)?;
        self.run_create(edit, provisional_id)
    }

    /// Moves one item to a drop slot, possibly in another day.
    pub fn move_item(
        &mut self,
        item_id: ItemId,
        target_day_id: DayId,
        index: usize,
    ) -> Result<(), CoordinatorError> {
        match self.begin_move_item(item_id, target_day_id, index)? {
            Some(edit) => self.run(edit).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Deletes one item and returns its place to the pool.
    pub fn remove_item(&mut self, item_id: ItemId) -> Result<(), CoordinatorError> {
        let edit = self.begin_remove_item(item_id)?;
        self.run(edit).map(|_| ())
    }

    /// Appends a copy of one item to a day. Returns the new item's id.
    pub fn copy_item(
        &mut self,
        item_id: ItemId,
        target_day_id: DayId,
    ) -> Result<ItemId, CoordinatorError> {
        let (edit, provisional_id) = self.start_copy_item(item_id, target_day_id)?;
        self.run_create(edit, provisional_id)
    }

    /// Applies a field patch to one item.
    pub fn update_item(&mut self, item_id: ItemId, patch: &ItemPatch) -> Result<(), CoordinatorError> {
        let edit = self.begin_update_item(item_id, patch)?;
        self.run(edit).map(|_| ())
    }

    /// Removes every item of one day.
    pub fn clear_day(&mut self, day_id: DayId) -> Result<(), CoordinatorError> {
        let edit = self.begin_clear_day(day_id)?;
        self.run(edit).map(|_| ())
    }

    /// Removes one day with its items and renumbers the days after it.
    pub fn delete_day(&mut self, day_id: DayId) -> Result<(), CoordinatorError> {
        let edit = self.begin_delete_day(day_id)?;
        self.run(edit).map(|_| ())
    }

    /// Applies a notes/default-transport patch to one day.
    pub fn update_day(&mut self, day_id: DayId, patch: &DayPatch) -> Result<(), CoordinatorError> {
        let edit = self.begin_update_day(day_id, patch)?;
        self.run(edit).map(|_| ())
    }

    /// Appends one day. The store assigns its id, so this is not optimistic.
    pub fn add_day(&mut self) -> Result<DayId, CoordinatorError> {
        let started_at = Instant::now();
        let day = self.repo.create_day(self.state.trip_id())?;
        let day_id = day.day_id;
        let day_number = day.day_number;
        self.state.push_day(day)?;
        self.mutations += 1;
        info!(
            "event=day_add module=service status=ok day_id={} day_number={} duration_ms={}",
            day_id,
            day_number,
            started_at.elapsed().as_millis()
        );
        Ok(day_id)
    }

    /// Replaces local state with the store's.
    ///
    /// Edits begun before the refresh are treated as superseded.
    pub fn refresh(&mut self) -> Result<(), CoordinatorError> {
        let started_at = Instant::now();
        let state = match fetch_state(&self.repo, self.state.trip_id()) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "event=itinerary_refresh module=service status=error error_code={} error={}",
                    err.code(),
                    err
                );
                return Err(err);
            }
        };
        self.state = state;
        self.provisional.clear();
        self.refreshed_through = self.last_version;
        self.mutations += 1;
        info!(
            "event=itinerary_refresh module=service status=ok days={} duration_ms={}",
            self.state.days().len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Routes a completed drag gesture to the matching edit.
    pub fn apply_drop(&mut self, intent: DropIntent) -> Result<(), CoordinatorError> {
        match intent {
            DropIntent::Add {
                place_id,
                day_id,
                index,
            } => self.add_item(place_id, day_id, index).map(|_| ()),
            DropIntent::Move {
                item_id,
                day_id,
                index,
            } => self.move_item(item_id, day_id, index),
            DropIntent::Unplace { item_id } => self.remove_item(item_id),
        }
    }

    /// Optimistically inserts a new item for an unplaced pool entry.
    ///
    /// The item carries a provisional id until the edit settles.
    pub fn begin_add_item(
        &mut self,
        place_id: PlaceId,
        day_id: DayId,
        index: usize,
    ) -> Result<PendingEdit, CoordinatorError> {
        self.start_add_item(place_id, day_id, index)
            .map(|(edit, _)| edit)
    }

    fn start_add_item(
        &mut self,
        place_id: PlaceId,
        day_id: DayId,
        index: usize,
    ) -> Result<(PendingEdit, ItemId), CoordinatorError> {
        let len = self.day_len(day_id)?;
        let entry = self
            .state
            .pool_entry(place_id)
            .ok_or(ValidationError::PlaceNotInPool(place_id))?;
        if entry.placed {
            return Err(ValidationError::PlaceAlreadyPlaced(place_id).into());
        }

        let slot = index.min(len);
        let epsilon = self.config.rebalance_epsilon;
        let before = self.state.clone();
        let provisional_id = self.mutate(&before, |state| {
            let sequence = state.key_for_slot(day_id, slot, epsilon)?;
            let item = ItineraryItem::new(day_id, place_id, sequence);
            let item_id = item.item_id;
            state.insert_item(item)?;
            if let Some(entry) = state.pool_entry_mut(place_id) {
                entry.link(item_id);
            }
            Ok(item_id)
        })?;
        self.provisional.insert(provisional_id);

        let request = EditRequest::CreateItem {
            provisional_id,
            request: CreateItemRequest::new(day_id, place_id, Some(slot)),
        };
        let edit = self.open_edit(request, before, None, &[provisional_id]);
        Ok((edit, provisional_id))
    }

    /// Optimistically moves one item. Returns `None` when the slot leaves the
    /// item where it is.
    pub fn begin_move_item(
        &mut self,
        item_id: ItemId,
        target_day_id: DayId,
        index: usize,
    ) -> Result<Option<PendingEdit>, CoordinatorError> {
        self.ensure_confirmed(item_id)?;
        let item = self
            .state
            .item(item_id)
            .cloned()
            .ok_or(ValidationError::UnknownItem(item_id))?;
        let slot = index.min(self.day_len(target_day_id)?);
        let same_day = item.day_id == target_day_id;

        let mut insert_at = slot;
        if same_day {
            let current = self
                .state
                .day(target_day_id)
                .and_then(|day| day.position_of(item_id))
                .ok_or(ValidationError::UnknownItem(item_id))?;
            if slot == current || slot == current + 1 {
                debug!(
                    "event=edit_begin module=service status=skipped op=reorder_item item_id={} reason=same_slot",
                    item_id
                );
                return Ok(None);
            }
            if slot > current {
                insert_at -= 1;
            }
        }

        let epsilon = self.config.rebalance_epsilon;
        let source_day_id = item.day_id;
        let client_timestamp = item.updated_at;
        let prior = self.prior_placement(item);
        let before = self.state.clone();
        self.mutate(&before, |state| {
            let mut moving = state
                .take_item(item_id)
                .ok_or(ValidationError::UnknownItem(item_id))?;
            moving.sequence = state.key_for_slot(target_day_id, insert_at, epsilon)?;
            moving.day_id = target_day_id;
            if !same_day {
                moving.clear_transport();
            }
            state.insert_item(moving)?;
            state.rebalance_if_needed(source_day_id, epsilon);
            state.recompute_pool_links();
            Ok(())
        })?;

        let request = EditRequest::ReorderItem {
            item_id,
            request: ReorderRequest {
                target_day_id,
                target_position: slot,
                client_timestamp: Some(client_timestamp),
            },
        };
        Ok(Some(self.open_edit(request, before, Some(prior), &[item_id])))
    }

    /// Optimistically deletes one item.
    pub fn begin_remove_item(&mut self, item_id: ItemId) -> Result<PendingEdit, CoordinatorError> {
        self.ensure_confirmed(item_id)?;
        let item = self
            .state
            .item(item_id)
            .cloned()
            .ok_or(ValidationError::UnknownItem(item_id))?;

        let epsilon = self.config.rebalance_epsilon;
        let day_id = item.day_id;
        let prior = self.prior_placement(item);
        let before = self.state.clone();
        self.mutate(&before, |state| {
            state
                .take_item(item_id)
                .ok_or(ValidationError::UnknownItem(item_id))?;
            state.rebalance_if_needed(day_id, epsilon);
            state.recompute_pool_links();
            Ok(())
        })?;

        let request = EditRequest::DeleteItem { item_id };
        Ok(self.open_edit(request, before, Some(prior), &[item_id]))
    }

    /// Optimistically appends a copy of one item to a day.
    pub fn begin_copy_item(
        &mut self,
        item_id: ItemId,
        target_day_id: DayId,
    ) -> Result<PendingEdit, CoordinatorError> {
        self.start_copy_item(item_id, target_day_id)
            .map(|(edit, _)| edit)
    }

    fn start_copy_item(
        &mut self,
        item_id: ItemId,
        target_day_id: DayId,
    ) -> Result<(PendingEdit, ItemId), CoordinatorError> {
        let source = self
            .state
            .item(item_id)
            .cloned()
            .ok_or(ValidationError::UnknownItem(item_id))?;
        let slot = self.day_len(target_day_id)?;

        let epsilon = self.config.rebalance_epsilon;
        let before = self.state.clone();
        let provisional_id = self.mutate(&before, |state| {
            let sequence = state.key_for_slot(target_day_id, slot, epsilon)?;
            let copy = source.copy_into(target_day_id, sequence);
            let copy_id = copy.item_id;
            state.insert_item(copy)?;
            state.recompute_pool_links();
            Ok(copy_id)
        })?;
        self.provisional.insert(provisional_id);

        let mut request = CreateItemRequest::new(target_day_id, source.place_id, None);
        request.scheduled_time = source.scheduled_time;
        request.duration_minutes = source.duration_minutes;
        request.notes = source.notes.clone();
        let request = EditRequest::CreateItem {
            provisional_id,
            request,
        };
        let edit = self.open_edit(request, before, None, &[provisional_id]);
        Ok((edit, provisional_id))
    }

    /// Optimistically applies a field patch to one item.
    pub fn begin_update_item(
        &mut self,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<PendingEdit, CoordinatorError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        self.ensure_confirmed(item_id)?;
        let item = self
            .state
            .item(item_id)
            .cloned()
            .ok_or(ValidationError::UnknownItem(item_id))?;
        let mut updated = item.clone();
        patch.apply_to(&mut updated);
        updated.validate().map_err(ValidationError::from)?;

        let prior = self.prior_placement(item);
        let before = self.state.clone();
        self.mutate(&before, |state| {
            let target = state
                .item_mut(item_id)
                .ok_or(ValidationError::UnknownItem(item_id))?;
            *target = updated;
            Ok(())
        })?;

        let request = EditRequest::UpdateItem {
            item_id,
            patch: patch.clone(),
        };
        Ok(self.open_edit(request, before, Some(prior), &[item_id]))
    }

    /// Optimistically empties one day.
    pub fn begin_clear_day(&mut self, day_id: DayId) -> Result<PendingEdit, CoordinatorError> {
        let item_ids = self.day_item_ids(day_id)?;
        let before = self.state.clone();
        self.mutate(&before, |state| {
            state.clear_day(day_id)?;
            state.recompute_pool_links();
            Ok(())
        })?;

        let request = EditRequest::ClearDay { day_id };
        Ok(self.open_edit(request, before, None, &item_ids))
    }

    /// Optimistically deletes one day and renumbers later days.
    pub fn begin_delete_day(&mut self, day_id: DayId) -> Result<PendingEdit, CoordinatorError> {
        let item_ids = self.day_item_ids(day_id)?;
        let before = self.state.clone();
        self.mutate(&before, |state| {
            state.remove_day(day_id)?;
            state.recompute_pool_links();
            Ok(())
        })?;

        let request = EditRequest::DeleteDay { day_id };
        Ok(self.open_edit(request, before, None, &item_ids))
    }

    /// Optimistically applies a day patch.
    pub fn begin_update_day(
        &mut self,
        day_id: DayId,
        patch: &DayPatch,
    ) -> Result<PendingEdit, CoordinatorError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        self.day_len(day_id)?;

        let before = self.state.clone();
        self.mutate(&before, |state| state.apply_day_patch(day_id, patch))?;

        let request = EditRequest::UpdateDay {
            day_id,
            patch: patch.clone(),
        };
        Ok(self.open_edit(request, before, None, &[]))
    }

    /// Performs the store call for one pending edit.
    pub fn dispatch(&self, edit: &PendingEdit) -> ItineraryRepoResult<EditResponse> {
        match &edit.request {
            EditRequest::CreateItem { request, .. } => {
                self.repo.create_item(request).map(EditResponse::Item)
            }
            EditRequest::ReorderItem { item_id, request } => {
                let request = ReorderRequest {
                    client_timestamp: self
                        .state
                        .item(*item_id)
                        .map(|item| item.updated_at)
                        .or(request.client_timestamp),
                    ..*request
                };
                self.repo
                    .reorder_item(*item_id, &request)
                    .map(EditResponse::Item)
            }
            EditRequest::UpdateItem { item_id, patch } => self
                .repo
                .update_item(*item_id, patch)
                .map(EditResponse::Item),
            EditRequest::DeleteItem { item_id } => {
                self.repo.delete_item(*item_id).map(|()| EditResponse::Done)
            }
            EditRequest::UpdateDay { day_id, patch } => {
                self.repo.update_day(*day_id, patch).map(EditResponse::Day)
            }
            EditRequest::ClearDay { day_id } => {
                self.repo.clear_day(*day_id).map(|()| EditResponse::Done)
            }
            EditRequest::DeleteDay { day_id } => {
                self.repo.delete_day(*day_id).map(|()| EditResponse::Done)
            }
        }
    }

    /// Folds a store answer into local state, or rolls the edit back.
    ///
    /// # Errors
    /// - The store failure, classified; local state is already rolled back
    ///   unless a later edit superseded this one.
    pub fn settle(
        &mut self,
        edit: PendingEdit,
        result: ItineraryRepoResult<EditResponse>,
    ) -> Result<Settlement, CoordinatorError> {
        match result {
            Ok(response) => Ok(self.confirm(edit, response)),
            Err(err) => Err(self.fail(edit, err)),
        }
    }

    fn run(&mut self, edit: PendingEdit) -> Result<Settlement, CoordinatorError> {
        let response = self.dispatch(&edit);
        self.settle(edit, response)
    }

    fn run_create(
        &mut self,
        edit: PendingEdit,
        provisional_id: ItemId,
    ) -> Result<ItemId, CoordinatorError> {
        match self.run(edit)? {
            Settlement::Created { item_id, .. } => Ok(item_id),
            Settlement::Confirmed | Settlement::Ignored => Ok(provisional_id),
        }
    }

    fn confirm(&mut self, edit: PendingEdit, response: EditResponse) -> Settlement {
        let op = edit.request.op();
        if self.is_superseded(&edit) {
            if let EditResponse::Item(stored) = &response {
                self.adopt_revision(stored);
            }
            info!(
                "event=edit_settle module=service status=stale op={} version={} duration_ms={}",
                op,
                edit.version,
                edit.started_at.elapsed().as_millis()
            );
            return Settlement::Ignored;
        }

        let settlement = match (&edit.request, response) {
            (EditRequest::CreateItem { provisional_id, .. }, EditResponse::Item(stored)) => {
                self.adopt_created(*provisional_id, &stored)
            }
            (
                EditRequest::ReorderItem { item_id, .. } | EditRequest::UpdateItem { item_id, .. },
                EditResponse::Item(stored),
            ) => {
                if let Some(item) = self.state.item_mut(*item_id) {
                    adopt_item_fields(item, &stored);
                }
                Settlement::Confirmed
            }
            (EditRequest::UpdateDay { day_id, .. }, EditResponse::Day(stored)) => {
                if let Some(day) = self.state.day_mut(*day_id) {
                    day.notes = stored.notes;
                    day.default_transport = stored.default_transport;
                }
                Settlement::Confirmed
            }
            (EditRequest::CreateItem { provisional_id, .. }, _) => {
                self.provisional.remove(provisional_id);
                warn!(
                    "event=edit_settle module=service status=error op={} version={} error_code=unexpected_response",
                    op, edit.version
                );
                Settlement::Ignored
            }
            _ => Settlement::Confirmed,
        };
        self.mutations += 1;

        info!(
            "event=edit_settle module=service status=ok op={} version={} duration_ms={}",
            op,
            edit.version,
            edit.started_at.elapsed().as_millis()
        );
        settlement
    }

    fn fail(&mut self, edit: PendingEdit, err: ItineraryRepoError) -> CoordinatorError {
        let op = edit.request.op();
        let version = edit.version;
        let elapsed_ms = edit.started_at.elapsed().as_millis();
        let error = CoordinatorError::from(err);

        if self.is_superseded(&edit) {
            warn!(
                "event=edit_settle module=service status=error op={} version={} duration_ms={} error_code={} rollback=skipped",
                op,
                version,
                elapsed_ms,
                error.code()
            );
            return error;
        }

        let rollback = self.roll_back(edit);
        warn!(
            "event=edit_settle module=service status=error op={} version={} duration_ms={} error_code={} rollback={}",
            op,
            version,
            elapsed_ms,
            error.code(),
            rollback
        );

        if matches!(error, CoordinatorError::Conflict(_)) {
            if let Err(refresh_error) = self.refresh() {
                warn!(
                    "event=conflict_refresh module=service status=error op={} version={} error_code={}",
                    op,
                    version,
                    refresh_error.code()
                );
            }
        }
        error
    }

    /// Undoes one failed edit and names the strategy used.
    fn roll_back(&mut self, edit: PendingEdit) -> &'static str {
        if let EditRequest::CreateItem { provisional_id, .. } = &edit.request {
            self.provisional.remove(provisional_id);
        }

        if edit.mutation_mark == self.mutations {
            self.state = edit.before;
            self.mutations += 1;
            return "snapshot";
        }

        match edit.request.item_id() {
            Some(item_id) => self.revert_item(item_id, edit.prior),
            None => self.refresh_after_rollback(),
        }
    }

    fn refresh_after_rollback(&mut self) -> &'static str {
        match self.refresh() {
            Ok(()) => "refresh",
            Err(_) => "failed",
        }
    }

    /// Puts one item back between its former neighbors, keeping the newest
    /// revision stamp seen for it.
    fn revert_item(&mut self, item_id: ItemId, prior: Option<PriorPlacement>) -> &'static str {
        let current = self.state.take_item(item_id);
        let Some(PriorPlacement {
            mut item,
            prev,
            next,
        }) = prior
        else {
            self.state.recompute_pool_links();
            self.mutations += 1;
            return "item";
        };
        if let Some(current) = current {
            item.updated_at = item.updated_at.max(current.updated_at);
        }

        let day_id = item.day_id;
        match self
            .state
            .restore_between(item, prev, next, self.config.rebalance_epsilon)
        {
            Ok(true) => {
                self.state.recompute_pool_links();
                self.mutations += 1;
                "item"
            }
            Ok(false) | Err(_) => {
                warn!(
                    "event=edit_rollback module=service status=error item_id={} day_id={} error_code=slot_lost",
                    item_id, day_id
                );
                self.refresh_after_rollback()
            }
        }
    }

    /// Takes a newer store revision for one item without touching its fields.
    fn adopt_revision(&mut self, stored: &ItineraryItem) {
        if let Some(item) = self.state.item_mut(stored.item_id) {
            if stored.updated_at > item.updated_at {
                item.updated_at = stored.updated_at;
                self.mutations += 1;
            }
        }
    }

    fn adopt_created(&mut self, provisional_id: ItemId, stored: &ItineraryItem) -> Settlement {
        self.provisional.remove(&provisional_id);
        if !self.state.rename_item(provisional_id, stored.item_id) {
            return Settlement::Ignored;
        }
        if let Some(item) = self.state.item_mut(stored.item_id) {
            adopt_item_fields(item, stored);
        }
        if let Some(version) = self.item_versions.remove(&provisional_id) {
            self.item_versions.insert(stored.item_id, version);
        }
        Settlement::Created {
            provisional_id,
            item_id: stored.item_id,
        }
    }

    fn is_superseded(&self, edit: &PendingEdit) -> bool {
        if edit.version <= self.refreshed_through {
            return true;
        }
        let newer = |latest: Option<&EditVersion>| latest.is_some_and(|v| *v > edit.version);
        match &edit.request {
            EditRequest::CreateItem { provisional_id, .. } => {
                !self.provisional.contains(provisional_id)
            }
            EditRequest::ReorderItem { item_id, .. }
            | EditRequest::UpdateItem { item_id, .. }
            | EditRequest::DeleteItem { item_id } => newer(self.item_versions.get(item_id)),
            EditRequest::UpdateDay { day_id, .. }
            | EditRequest::ClearDay { day_id }
            | EditRequest::DeleteDay { day_id } => newer(self.day_versions.get(day_id)),
        }
    }

    /// Runs a state mutation, restoring `before` if it fails halfway.
    fn mutate<T>(
        &mut self,
        before: &ItineraryState,
        apply: impl FnOnce(&mut ItineraryState) -> Result<T, ValidationError>,
    ) -> Result<T, CoordinatorError> {
        match apply(&mut self.state) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state = before.clone();
                Err(err.into())
            }
        }
    }

    fn open_edit(
        &mut self,
        request: EditRequest,
        before: ItineraryState,
        prior: Option<PriorPlacement>,
        touched: &[ItemId],
    ) -> PendingEdit {
        self.last_version += 1;
        let version = self.last_version;
        for item_id in touched {
            self.item_versions.insert(*item_id, version);
        }
        if let Some(day_id) = request.day_id() {
            self.day_versions.insert(day_id, version);
        }
        self.mutations += 1;

        debug!(
            "event=edit_begin module=service status=ok op={} version={}",
            request.op(),
            version
        );
        PendingEdit {
            version,
            request,
            before,
            prior,
            mutation_mark: self.mutations,
            started_at: Instant::now(),
        }
    }

    fn prior_placement(&self, item: ItineraryItem) -> PriorPlacement {
        let (prev, next) = self.state.neighbors(item.item_id).unwrap_or((None, None));
        PriorPlacement { item, prev, next }
    }

    fn ensure_confirmed(&self, item_id: ItemId) -> Result<(), CoordinatorError> {
        if self.provisional.contains(&item_id) {
            return Err(CoordinatorError::ItemPending(item_id));
        }
        Ok(())
    }

    fn day_len(&self, day_id: DayId) -> Result<usize, ValidationError> {
        self.state
            .day(day_id)
            .map(|day| day.items.len())
            .ok_or(ValidationError::UnknownDay(day_id))
    }

    /// Ids of one day's items; fails while any of them is provisional.
    fn day_item_ids(&self, day_id: DayId) -> Result<Vec<ItemId>, CoordinatorError> {
        let day = self
            .state
            .day(day_id)
            .ok_or(ValidationError::UnknownDay(day_id))?;
        let item_ids: Vec<ItemId> = day.items.iter().map(|item| item.item_id).collect();
        if let Some(pending) = item_ids.iter().find(|id| self.provisional.contains(id)) {
            return Err(CoordinatorError::ItemPending(*pending));
        }
        Ok(item_ids)
    }
}

fn fetch_state<R: ItineraryRepository>(
    repo: &R,
    trip_id: TripId,
) -> Result<ItineraryState, CoordinatorError> {
    let days = repo.list_days(trip_id)?;
    let pool = repo.list_pool(trip_id)?;
    ItineraryState::new(trip_id, days, pool)
        .map_err(|err| CoordinatorError::Validation(err.into()))
}

/// Takes the store's descriptive fields and revision; order stays local.
fn adopt_item_fields(item: &mut ItineraryItem, stored: &ItineraryItem) {
    item.scheduled_time = stored.scheduled_time;
    item.duration_minutes = stored.duration_minutes;
    item.notes = stored.notes.clone();
    item.transport_to_next = stored.transport_to_next;
    item.transport_duration_minutes = stored.transport_duration_minutes;
    item.updated_at = stored.updated_at;
}
