//! Itinerary repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the authoritative-store contract the reorder coordinator calls.
//! - Apply positional inserts/moves with the same fractional keys as the
//!   client, so both sides agree on order.
//! - Keep pool back-references in step with item lifecycle.
//!
//! # Invariants
//! - Day listing is deterministic: `day_number ASC`, items `sequence ASC`.
//! - `(day_uuid, sequence)` is unique; rebalance renumbers a whole day.
//! - `updated_at` strictly increases on every item write and doubles as the
//!   optimistic-concurrency token checked by `reorder_item`.

use crate::db::{ensure_schema_ready, DbError, RequiredTable};
use crate::model::itinerary::{
    validate_duration, DayId, DayPatch, ItemId, ItemPatch, ItineraryDay, ItineraryItem,
    ModelValidationError, TransportMode, TripId,
};
use crate::model::place::{PlaceId, PoolEntry};
use crate::ordering::sequence::{
    canonical_key, key_for_index, needs_rebalance_with, try_key_for_index, REBALANCE_EPSILON,
};
use crate::repo::parse_uuid;
use chrono::{Days, NaiveDate, NaiveTime};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const REVISION_BUMP_SQL: &str = "MAX(updated_at + 1, strftime('%s', 'now') * 1000)";

const ITEM_SELECT_SQL: &str = "SELECT
    item_uuid,
    day_uuid,
    place_uuid,
    sequence,
    scheduled_time,
    duration_minutes,
    notes,
    transport_to_next,
    transport_duration_minutes,
    updated_at
FROM itinerary_items";

const DAY_SELECT_SQL: &str = "SELECT
    day_uuid,
    trip_uuid,
    day_number,
    date,
    notes,
    default_transport
FROM itinerary_days";

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        name: "itinerary_days",
        columns: &[
            "day_uuid",
            "trip_uuid",
            "day_number",
            "date",
            "notes",
            "default_transport",
        ],
    },
    RequiredTable {
        name: "itinerary_items",
        columns: &[
            "item_uuid",
            "day_uuid",
            "place_uuid",
            "sequence",
            "scheduled_time",
            "duration_minutes",
            "notes",
            "transport_to_next",
            "transport_duration_minutes",
            "updated_at",
        ],
    },
    RequiredTable {
        name: "pool_entries",
        columns: &["trip_uuid", "place_uuid", "is_placed", "current_item_uuid"],
    },
];

/// Result type used by itinerary repository operations.
pub type ItineraryRepoResult<T> = Result<T, ItineraryRepoError>;

/// Coarse failure class used by callers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    /// Request rejected as malformed; nothing changed.
    Validation,
    /// Referenced entity is unknown to the store.
    NotFound,
    /// Store state moved on since the client last saw it.
    Conflict,
    /// Transport or storage failure.
    Network,
}

/// Errors from itinerary repository operations.
#[derive(Debug)]
pub enum ItineraryRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Field-level validation failure.
    Model(ModelValidationError),
    /// Request is inconsistent with store state.
    Validation(String),
    TripNotFound(TripId),
    DayNotFound(DayId),
    ItemNotFound(ItemId),
    /// Place is not saved in the trip pool.
    PlaceNotInPool { trip_id: TripId, place_id: PlaceId },
    /// Item changed after the client's timestamp.
    Conflict {
        item_id: ItemId,
        stored_revision: i64,
        client_timestamp: i64,
    },
    /// Transport failure reported by a remote store.
    Network(String),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl ItineraryRepoError {
    /// Classifies this error for rollback/refresh decisions.
    pub fn kind(&self) -> RepoErrorKind {
        match self {
            Self::Model(_) | Self::Validation(_) => RepoErrorKind::Validation,
            Self::TripNotFound(_)
            | Self::DayNotFound(_)
            | Self::ItemNotFound(_)
            | Self::PlaceNotInPool { .. } => RepoErrorKind::NotFound,
            Self::Conflict { .. } => RepoErrorKind::Conflict,
            Self::Db(_) | Self::Network(_) | Self::InvalidData(_) => RepoErrorKind::Network,
        }
    }
}

impl Display for ItineraryRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::Validation(message) => write!(f, "invalid itinerary request: {message}"),
            Self::TripNotFound(id) => write!(f, "trip not found: {id}"),
            Self::DayNotFound(id) => write!(f, "itinerary day not found: {id}"),
            Self::ItemNotFound(id) => write!(f, "itinerary item not found: {id}"),
            Self::PlaceNotInPool { trip_id, place_id } => {
                write!(f, "place {place_id} is not saved in trip {trip_id}")
            }
            Self::Conflict {
                item_id,
                stored_revision,
                client_timestamp,
            } => write!(
                f,
                "item {item_id} changed at {stored_revision}, after client timestamp {client_timestamp}"
            ),
            Self::Network(message) => write!(f, "itinerary store unreachable: {message}"),
            Self::InvalidData(message) => write!(f, "invalid itinerary data: {message}"),
        }
    }
}

impl Error for ItineraryRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Model(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ItineraryRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ItineraryRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ModelValidationError> for ItineraryRepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Model(value)
    }
}

/// Request to create one item in a day.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateItemRequest {
    pub day_id: DayId,
    pub place_id: PlaceId,
    /// Slot in the day's current list; `None` appends.
    pub position: Option<usize>,
    pub scheduled_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
}

impl CreateItemRequest {
    /// Request without descriptive fields.
    pub fn new(day_id: DayId, place_id: PlaceId, position: Option<usize>) -> Self {
        Self {
            day_id,
            place_id,
            position,
            scheduled_time: None,
            duration_minutes: None,
            notes: None,
        }
    }
}

/// Request to move one item to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderRequest {
    pub target_day_id: DayId,
    /// Drop slot in the target day's current list, which still contains the
    /// item for same-day moves.
    pub target_position: usize,
    /// Last `updated_at` the client saw for the item.
    pub client_timestamp: Option<i64>,
}

/// Repository interface for the authoritative itinerary store.
pub trait ItineraryRepository {
    /// Creates one item at a slot and links its pool entry.
    fn create_item(&self, request: &CreateItemRequest) -> ItineraryRepoResult<ItineraryItem>;
    /// Moves one item to a slot, possibly across days.
    fn reorder_item(
        &self,
        item_id: ItemId,
        request: &ReorderRequest,
    ) -> ItineraryRepoResult<ItineraryItem>;
    /// Applies a field patch to one item.
    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> ItineraryRepoResult<ItineraryItem>;
    /// Deletes one item and unlinks its pool entry.
    fn delete_item(&self, item_id: ItemId) -> ItineraryRepoResult<()>;
    /// Lists all days of a trip with ordered items.
    fn list_days(&self, trip_id: TripId) -> ItineraryRepoResult<Vec<ItineraryDay>>;
    /// Lists the trip's saved-place pool.
    fn list_pool(&self, trip_id: TripId) -> ItineraryRepoResult<Vec<PoolEntry>>;
    /// Appends one day to a trip.
    fn create_day(&self, trip_id: TripId) -> ItineraryRepoResult<ItineraryDay>;
    /// Applies a field patch to one day.
    fn update_day(&self, day_id: DayId, patch: &DayPatch) -> ItineraryRepoResult<ItineraryDay>;
    /// Deletes one day with its items and renumbers later days.
    fn delete_day(&self, day_id: DayId) -> ItineraryRepoResult<()>;
    /// Deletes every item of one day.
    fn clear_day(&self, day_id: DayId) -> ItineraryRepoResult<()>;
}

/// SQLite-backed itinerary repository.
pub struct SqliteItineraryRepository<'conn> {
    conn: &'conn Connection,
    rebalance_epsilon: f64,
}

impl<'conn> SqliteItineraryRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ItineraryRepoResult<Self> {
        ensure_schema_ready(conn, REQUIRED_TABLES)?;
        Ok(Self {
            conn,
            rebalance_epsilon: REBALANCE_EPSILON,
        })
    }

    /// Overrides the minimum key gap tolerated before a day is rebalanced.
    pub fn with_rebalance_epsilon(mut self, epsilon: f64) -> Self {
        self.rebalance_epsilon = epsilon;
        self
    }

    /// Loads one item by id.
    pub fn get_item(&self, item_id: ItemId) -> ItineraryRepoResult<Option<ItineraryItem>> {
        load_item(self.conn, item_id)
    }

    fn begin(&self) -> ItineraryRepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Computes the key for `slot` among `keys`, rebalancing `ids` first when
    /// the slot has no room left.
    fn allocate_key(
        &self,
        conn: &Connection,
        day_id: DayId,
        ids: &[ItemId],
        keys: &[f64],
        slot: usize,
    ) -> ItineraryRepoResult<f64> {
        match try_key_for_index(keys, slot, self.rebalance_epsilon) {
            Ok(key) => Ok(key),
            Err(err) => {
                info!(
                    "event=sequence_rebalance module=repo status=start day_id={} items={} reason=precision_exhausted",
                    day_id,
                    ids.len()
                );
                rebalance_rows(conn, ids)?;
                let canonical: Vec<f64> = (0..ids.len()).map(canonical_key).collect();
                let key = key_for_index(&canonical, slot);
                info!(
                    "event=sequence_rebalance module=repo status=ok day_id={} detail={}",
                    day_id, err
                );
                Ok(key)
            }
        }
    }
}

impl ItineraryRepository for SqliteItineraryRepository<'_> {
    fn create_item(&self, request: &CreateItemRequest) -> ItineraryRepoResult<ItineraryItem> {
        validate_duration("duration_minutes", request.duration_minutes)?;

        let tx = self.begin()?;
        let trip_id = load_day_trip(&tx, request.day_id)?
            .ok_or(ItineraryRepoError::DayNotFound(request.day_id))?;
        if !pool_entry_exists(&tx, trip_id, request.place_id)? {
            return Err(ItineraryRepoError::PlaceNotInPool {
                trip_id,
                place_id: request.place_id,
            });
        }

        let (ids, keys) = list_day_keys(&tx, request.day_id)?;
        let slot = request.position.unwrap_or(ids.len()).min(ids.len());
        let sequence = self.allocate_key(&tx, request.day_id, &ids, &keys, slot)?;

        let item_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO itinerary_items (
                item_uuid,
                day_uuid,
                place_uuid,
                sequence,
                scheduled_time,
                duration_minutes,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                item_id.to_string(),
                request.day_id.to_string(),
                request.place_id.to_string(),
                sequence,
                request.scheduled_time,
                request.duration_minutes,
                request.notes.as_deref(),
            ],
        )?;
        sync_pool_entry(&tx, trip_id, request.place_id)?;

        let item = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;
        tx.commit()?;
        Ok(item)
    }

    fn reorder_item(
        &self,
        item_id: ItemId,
        request: &ReorderRequest,
    ) -> ItineraryRepoResult<ItineraryItem> {
        let tx = self.begin()?;
        let item = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;

        if let Some(client_timestamp) = request.client_timestamp {
            if item.updated_at > client_timestamp {
                return Err(ItineraryRepoError::Conflict {
                    item_id,
                    stored_revision: item.updated_at,
                    client_timestamp,
                });
            }
        }

        let source_trip = load_day_trip(&tx, item.day_id)?
            .ok_or(ItineraryRepoError::DayNotFound(item.day_id))?;
        let target_trip = load_day_trip(&tx, request.target_day_id)?
            .ok_or(ItineraryRepoError::DayNotFound(request.target_day_id))?;
        if source_trip != target_trip {
            return Err(ItineraryRepoError::Validation(format!(
                "day {} belongs to another trip",
                request.target_day_id
            )));
        }

        let same_day = item.day_id == request.target_day_id;
        let (mut ids, mut keys) = list_day_keys(&tx, request.target_day_id)?;
        let mut slot = request.target_position.min(ids.len());
        if same_day {
            let Some(current) = ids.iter().position(|id| *id == item_id) else {
                return Err(ItineraryRepoError::InvalidData(format!(
                    "item {item_id} missing from its own day"
                )));
            };
            if slot == current || slot == current + 1 {
                return Ok(item);
            }
            ids.remove(current);
            keys.remove(current);
            if slot > current {
                slot -= 1;
            }
            // Park the item so a rebalance of its siblings cannot collide.
            tx.execute(
                "UPDATE itinerary_items SET sequence = ?2 WHERE item_uuid = ?1;",
                params![item_id.to_string(), -(ids.len() as f64) - 2.0],
            )?;
        }

        let sequence = self.allocate_key(&tx, request.target_day_id, &ids, &keys, slot)?;
        let transport_reset = if same_day { "" } else { ", transport_to_next = NULL, transport_duration_minutes = NULL" };
        tx.execute(
            &format!(
                "UPDATE itinerary_items
                 SET day_uuid = ?2,
                     sequence = ?3{transport_reset},
                     updated_at = {REVISION_BUMP_SQL}
                 WHERE item_uuid = ?1;"
            ),
            params![
                item_id.to_string(),
                request.target_day_id.to_string(),
                sequence
            ],
        )?;
        sync_pool_entry(&tx, target_trip, item.place_id)?;

        let moved = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;
        tx.commit()?;
        Ok(moved)
    }

    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> ItineraryRepoResult<ItineraryItem> {
        let tx = self.begin()?;
        let mut item = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;
        patch.apply_to(&mut item);
        item.validate()?;

        tx.execute(
            &format!(
                "UPDATE itinerary_items
                 SET scheduled_time = ?2,
                     duration_minutes = ?3,
                     notes = ?4,
                     transport_to_next = ?5,
                     transport_duration_minutes = ?6,
                     updated_at = {REVISION_BUMP_SQL}
                 WHERE item_uuid = ?1;"
            ),
            params![
                item_id.to_string(),
                item.scheduled_time,
                item.duration_minutes,
                item.notes.as_deref(),
                item.transport_to_next.map(TransportMode::as_str),
                item.transport_duration_minutes,
            ],
        )?;

        let updated = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_item(&self, item_id: ItemId) -> ItineraryRepoResult<()> {
        let tx = self.begin()?;
        let item = load_item(&tx, item_id)?.ok_or(ItineraryRepoError::ItemNotFound(item_id))?;
        let trip_id =
            load_day_trip(&tx, item.day_id)?.ok_or(ItineraryRepoError::DayNotFound(item.day_id))?;

        tx.execute(
            "DELETE FROM itinerary_items WHERE item_uuid = ?1;",
            [item_id.to_string()],
        )?;
        sync_pool_entry(&tx, trip_id, item.place_id)?;

        let (ids, keys) = list_day_keys(&tx, item.day_id)?;
        if needs_rebalance_with(&keys, self.rebalance_epsilon) {
            rebalance_rows(&tx, &ids)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_days(&self, trip_id: TripId) -> ItineraryRepoResult<Vec<ItineraryDay>> {
        if !trip_exists(self.conn, trip_id)? {
            return Err(ItineraryRepoError::TripNotFound(trip_id));
        }

        let mut stmt = self.conn.prepare(&format!(
            "{DAY_SELECT_SQL}
             WHERE trip_uuid = ?1
             ORDER BY day_number ASC, day_uuid ASC;"
        ))?;
        let mut rows = stmt.query([trip_id.to_string()])?;
        let mut days = Vec::new();
        while let Some(row) = rows.next()? {
            days.push(parse_day_row(row)?);
        }

        for day in &mut days {
            day.items = list_day_items(self.conn, day.day_id)?;
        }
        Ok(days)
    }

    fn list_pool(&self, trip_id: TripId) -> ItineraryRepoResult<Vec<PoolEntry>> {
        if !trip_exists(self.conn, trip_id)? {
            return Err(ItineraryRepoError::TripNotFound(trip_id));
        }

        let mut stmt = self.conn.prepare(
            "SELECT place_uuid, notes, is_placed, current_item_uuid
             FROM pool_entries
             WHERE trip_uuid = ?1
             ORDER BY saved_at ASC, place_uuid ASC;",
        )?;
        let mut rows = stmt.query([trip_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_pool_row(row)?);
        }
        Ok(entries)
    }

    fn create_day(&self, trip_id: TripId) -> ItineraryRepoResult<ItineraryDay> {
        let tx = self.begin()?;
        let start_date: Option<NaiveDate> = tx
            .query_row(
                "SELECT start_date FROM trips WHERE trip_uuid = ?1;",
                [trip_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(ItineraryRepoError::TripNotFound(trip_id))?;

        let last_number: u32 = tx.query_row(
            "SELECT COALESCE(MAX(day_number), 0)
             FROM itinerary_days
             WHERE trip_uuid = ?1;",
            [trip_id.to_string()],
            |row| row.get(0),
        )?;
        let day_number = last_number + 1;
        let date = start_date
            .and_then(|start| start.checked_add_days(Days::new(u64::from(day_number - 1))));

        let day = ItineraryDay::new(trip_id, day_number, date);
        tx.execute(
            "INSERT INTO itinerary_days (day_uuid, trip_uuid, day_number, date)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                day.day_id.to_string(),
                trip_id.to_string(),
                day_number,
                date
            ],
        )?;
        tx.commit()?;
        Ok(day)
    }

    fn update_day(&self, day_id: DayId, patch: &DayPatch) -> ItineraryRepoResult<ItineraryDay> {
        let tx = self.begin()?;
        let mut day = load_day(&tx, day_id)?.ok_or(ItineraryRepoError::DayNotFound(day_id))?;
        patch.apply_to(&mut day);

        tx.execute(
            "UPDATE itinerary_days
             SET notes = ?2,
                 default_transport = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE day_uuid = ?1;",
            params![
                day_id.to_string(),
                day.notes.as_deref(),
                day.default_transport.map(TransportMode::as_str),
            ],
        )?;
        day.items = list_day_items(&tx, day_id)?;
        tx.commit()?;
        Ok(day)
    }

    fn delete_day(&self, day_id: DayId) -> ItineraryRepoResult<()> {
        let tx = self.begin()?;
        let day = load_day(&tx, day_id)?.ok_or(ItineraryRepoError::DayNotFound(day_id))?;
        let places = list_day_places(&tx, day_id)?;

        tx.execute(
            "DELETE FROM itinerary_days WHERE day_uuid = ?1;",
            [day_id.to_string()],
        )?;
        tx.execute(
            "UPDATE itinerary_days
             SET day_number = day_number - 1,
                 date = CASE WHEN date IS NULL THEN NULL ELSE date(date, '-1 day') END,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE trip_uuid = ?1
               AND day_number > ?2;",
            params![day.trip_id.to_string(), day.day_number],
        )?;
        for place_id in places {
            sync_pool_entry(&tx, day.trip_id, place_id)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn clear_day(&self, day_id: DayId) -> ItineraryRepoResult<()> {
        let tx = self.begin()?;
        let trip_id = load_day_trip(&tx, day_id)?.ok_or(ItineraryRepoError::DayNotFound(day_id))?;
        let places = list_day_places(&tx, day_id)?;

        tx.execute(
            "DELETE FROM itinerary_items WHERE day_uuid = ?1;",
            [day_id.to_string()],
        )?;
        for place_id in places {
            sync_pool_entry(&tx, trip_id, place_id)?;
        }

        tx.commit()?;
        Ok(())
    }
}

/// Recomputes one pool entry's back-reference from live items.
///
/// Keeps a still-live link; otherwise links the first live item of the same
/// place in day/sequence order; otherwise unplaces the entry.
fn sync_pool_entry(
    conn: &Connection,
    trip_id: TripId,
    place_id: PlaceId,
) -> ItineraryRepoResult<()> {
    let current: Option<Option<String>> = conn
        .query_row(
            "SELECT current_item_uuid
             FROM pool_entries
             WHERE trip_uuid = ?1
               AND place_uuid = ?2;",
            params![trip_id.to_string(), place_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(());
    };

    if let Some(current) = current {
        let still_live: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM itinerary_items i
                INNER JOIN itinerary_days d ON d.day_uuid = i.day_uuid
                WHERE i.item_uuid = ?1
                  AND i.place_uuid = ?2
                  AND d.trip_uuid = ?3
            );",
            params![current, place_id.to_string(), trip_id.to_string()],
            |row| row.get(0),
        )?;
        if still_live == 1 {
            return Ok(());
        }
    }

    let replacement: Option<String> = conn
        .query_row(
            "SELECT i.item_uuid
             FROM itinerary_items i
             INNER JOIN itinerary_days d ON d.day_uuid = i.day_uuid
             WHERE d.trip_uuid = ?1
               AND i.place_uuid = ?2
             ORDER BY d.day_number ASC, i.sequence ASC, i.item_uuid ASC
             LIMIT 1;",
            params![trip_id.to_string(), place_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    conn.execute(
        "UPDATE pool_entries
         SET is_placed = ?3,
             current_item_uuid = ?4
         WHERE trip_uuid = ?1
           AND place_uuid = ?2;",
        params![
            trip_id.to_string(),
            place_id.to_string(),
            i64::from(replacement.is_some()),
            replacement,
        ],
    )?;
    Ok(())
}

/// Assigns canonical keys to `ids` in order, in two passes so the unique
/// `(day_uuid, sequence)` index never sees a transient duplicate.
fn rebalance_rows(conn: &Connection, ids: &[ItemId]) -> ItineraryRepoResult<()> {
    for (index, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE itinerary_items SET sequence = ?2 WHERE item_uuid = ?1;",
            params![id.to_string(), -canonical_key(index)],
        )?;
    }
    for (index, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE itinerary_items SET sequence = ?2 WHERE item_uuid = ?1;",
            params![id.to_string(), canonical_key(index)],
        )?;
    }
    Ok(())
}

fn trip_exists(conn: &Connection, trip_id: TripId) -> ItineraryRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trips WHERE trip_uuid = ?1);",
        [trip_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn pool_entry_exists(
    conn: &Connection,
    trip_id: TripId,
    place_id: PlaceId,
) -> ItineraryRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM pool_entries
            WHERE trip_uuid = ?1
              AND place_uuid = ?2
        );",
        params![trip_id.to_string(), place_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_day_trip(conn: &Connection, day_id: DayId) -> ItineraryRepoResult<Option<TripId>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT trip_uuid FROM itinerary_days WHERE day_uuid = ?1;",
            [day_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|text| {
            parse_uuid(&text, "itinerary_days.trip_uuid").map_err(ItineraryRepoError::InvalidData)
        })
        .transpose()
}

fn load_day(conn: &Connection, day_id: DayId) -> ItineraryRepoResult<Option<ItineraryDay>> {
    let mut stmt = conn.prepare(&format!("{DAY_SELECT_SQL} WHERE day_uuid = ?1;"))?;
    let mut rows = stmt.query([day_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_day_row(row)?));
    }
    Ok(None)
}

fn load_item(conn: &Connection, item_id: ItemId) -> ItineraryRepoResult<Option<ItineraryItem>> {
    let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE item_uuid = ?1;"))?;
    let mut rows = stmt.query([item_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_item_row(row)?));
    }
    Ok(None)
}

fn list_day_items(conn: &Connection, day_id: DayId) -> ItineraryRepoResult<Vec<ItineraryItem>> {
    let mut stmt = conn.prepare(&format!(
        "{ITEM_SELECT_SQL}
         WHERE day_uuid = ?1
         ORDER BY sequence ASC, item_uuid ASC;"
    ))?;
    let mut rows = stmt.query([day_id.to_string()])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_item_row(row)?);
    }
    Ok(items)
}

fn list_day_keys(
    conn: &Connection,
    day_id: DayId,
) -> ItineraryRepoResult<(Vec<ItemId>, Vec<f64>)> {
    let mut stmt = conn.prepare(
        "SELECT item_uuid, sequence
         FROM itinerary_items
         WHERE day_uuid = ?1
         ORDER BY sequence ASC, item_uuid ASC;",
    )?;
    let mut rows = stmt.query([day_id.to_string()])?;
    let mut ids = Vec::new();
    let mut keys = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(
            parse_uuid(&value, "itinerary_items.item_uuid")
                .map_err(ItineraryRepoError::InvalidData)?,
        );
        keys.push(row.get(1)?);
    }
    Ok((ids, keys))
}

fn list_day_places(conn: &Connection, day_id: DayId) -> ItineraryRepoResult<Vec<PlaceId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT place_uuid
         FROM itinerary_items
         WHERE day_uuid = ?1;",
    )?;
    let mut rows = stmt.query([day_id.to_string()])?;
    let mut places = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        places.push(
            parse_uuid(&value, "itinerary_items.place_uuid")
                .map_err(ItineraryRepoError::InvalidData)?,
        );
    }
    Ok(places)
}

fn parse_item_row(row: &Row<'_>) -> ItineraryRepoResult<ItineraryItem> {
    let item_id = parse_uuid_column(row, "item_uuid", "itinerary_items.item_uuid")?;
    let day_id = parse_uuid_column(row, "day_uuid", "itinerary_items.day_uuid")?;
    let place_id = parse_uuid_column(row, "place_uuid", "itinerary_items.place_uuid")?;
    let transport_to_next =
        parse_transport(row, "transport_to_next", "itinerary_items.transport_to_next")?;

    Ok(ItineraryItem {
        item_id,
        day_id,
        place_id,
        sequence: row.get("sequence")?,
        scheduled_time: row.get("scheduled_time")?,
        duration_minutes: row.get("duration_minutes")?,
        notes: row.get("notes")?,
        transport_to_next,
        transport_duration_minutes: row.get("transport_duration_minutes")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_day_row(row: &Row<'_>) -> ItineraryRepoResult<ItineraryDay> {
    let day_id = parse_uuid_column(row, "day_uuid", "itinerary_days.day_uuid")?;
    let trip_id = parse_uuid_column(row, "trip_uuid", "itinerary_days.trip_uuid")?;
    let default_transport =
        parse_transport(row, "default_transport", "itinerary_days.default_transport")?;

    Ok(ItineraryDay {
        day_id,
        trip_id,
        day_number: row.get("day_number")?,
        date: row.get("date")?,
        notes: row.get("notes")?,
        default_transport,
        items: Vec::new(),
    })
}

fn parse_pool_row(row: &Row<'_>) -> ItineraryRepoResult<PoolEntry> {
    let place_id = parse_uuid_column(row, "place_uuid", "pool_entries.place_uuid")?;
    let current_item_id = row
        .get::<_, Option<String>>("current_item_uuid")?
        .map(|value| {
            parse_uuid(&value, "pool_entries.current_item_uuid")
                .map_err(ItineraryRepoError::InvalidData)
        })
        .transpose()?;
    let placed = match row.get::<_, i64>("is_placed")? {
        0 => false,
        1 => true,
        other => {
            return Err(ItineraryRepoError::InvalidData(format!(
                "invalid is_placed value `{other}` in pool_entries.is_placed"
            )));
        }
    };

    Ok(PoolEntry {
        place_id,
        placed,
        current_item_id,
        notes: row.get("notes")?,
    })
}

fn parse_uuid_column(
    row: &Row<'_>,
    name: &str,
    column: &'static str,
) -> ItineraryRepoResult<Uuid> {
    let value: String = row.get(name)?;
    parse_uuid(&value, column).map_err(ItineraryRepoError::InvalidData)
}

fn parse_transport(
    row: &Row<'_>,
    name: &str,
    column: &'static str,
) -> ItineraryRepoResult<Option<TransportMode>> {
    match row.get::<_, Option<String>>(name)? {
        Some(value) => TransportMode::parse(&value).map(Some).ok_or_else(|| {
            ItineraryRepoError::InvalidData(format!("invalid transport `{value}` in {column}"))
        }),
        None => Ok(None),
    }
}
